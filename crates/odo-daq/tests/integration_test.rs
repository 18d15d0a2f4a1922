use std::io::{BufRead, BufReader};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn odo_daq() -> Command {
    let bin_path = std::env::var("CARGO_BIN_EXE_odo-daq").unwrap_or_else(|_| {
        let candidates = [
            "../../target/release/odo-daq",
            "target/release/odo-daq",
            "../../target/debug/odo-daq",
            "target/debug/odo-daq",
        ];
        for candidate in candidates {
            if Path::new(candidate).exists() {
                return candidate.to_string();
            }
        }
        panic!("Failed to locate odo-daq binary. Expected CARGO_BIN_EXE_odo-daq or a build in target/{{release,debug}}/odo-daq.");
    });
    let mut cmd = Command::new(bin_path);
    cmd.env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    let port = listener.local_addr().unwrap().port();
    format!("127.0.0.1:{port}")
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if start.elapsed() > limit {
            let _ = child.kill();
            panic!("odo-daq did not exit within {limit:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn csv_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    files
}

#[test]
fn replay_run_logs_every_good_line() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    std::fs::write(
        &capture,
        "{\"speed\": 10.5}\n{\"speed\": \"oops\"}\n{\"speed\": \"11.25\"}\n{\"speed\": 12}\n",
    )
    .unwrap();
    let out = dir.path().join("out");

    let status = odo_daq()
        .args(["--source", "replay", "--no-bridge"])
        .arg("--replay")
        .arg(&capture)
        .arg("--output-dir")
        .arg(&out)
        .status()
        .expect("Failed to start odo-daq");
    assert!(status.success());

    let files = csv_files(&out);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("Pengukuran_odometer_DC.csv"));

    let content = std::fs::read_to_string(&files[0]).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "Timestamp,Speed");
    let speeds: Vec<&str> = lines[1..]
        .iter()
        .map(|row| row.rsplit(',').next().unwrap())
        .collect();
    assert_eq!(speeds, vec!["10.5", "11.25", "12"]);
}

#[test]
fn second_run_never_overwrites_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("capture.jsonl");
    std::fs::write(&capture, "{\"speed\": 1}\n").unwrap();

    for _ in 0..2 {
        let status = odo_daq()
            .args(["--source", "replay", "--no-bridge", "--output-name", "run"])
            .arg("--replay")
            .arg(&capture)
            .arg("--output-dir")
            .arg(dir.path())
            .status()
            .unwrap();
        assert!(status.success());
    }

    let names: Vec<String> = csv_files(dir.path())
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["run 1.csv", "run.csv"]);
}

#[test]
fn simulated_wheel_streams_to_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let bind_addr = free_addr();

    let mut child = odo_daq()
        .args([
            "--source",
            "sim",
            "--sim-rpm",
            "60",
            "--window-ms",
            "200",
            "--run-seconds",
            "3",
            "--bind",
            &bind_addr,
        ])
        .arg("--output-dir")
        .arg(dir.path())
        .spawn()
        .expect("Failed to start odo-daq");

    let start = Instant::now();
    let stream = loop {
        match TcpStream::connect(&bind_addr) {
            Ok(stream) => break stream,
            Err(_) if start.elapsed() < Duration::from_secs(5) => {
                thread::sleep(Duration::from_millis(50))
            }
            Err(e) => {
                let _ = child.kill();
                panic!("bridge never came up: {e}");
            }
        }
    };
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let msg: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(msg["type"], "speed_data");
    let rpm = msg["rpm"].as_f64().unwrap();
    assert!((30.0..=90.0).contains(&rpm), "rpm {rpm} far from 60");
    assert!(msg["distance_cm"].as_f64().is_some());

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    assert!(status.success());

    let files = csv_files(dir.path());
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.starts_with("Timestamp,RPM,Speed (cm/s)\n"));
    assert!(content.lines().count() > 5);
}

#[test]
fn missing_replay_file_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let status = odo_daq()
        .args(["--source", "replay", "--no-bridge", "--replay"])
        .arg(dir.path().join("absent.jsonl"))
        .arg("--output-dir")
        .arg(dir.path())
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn unwritable_output_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut child = odo_daq()
        .args(["--source", "sim", "--no-bridge", "--run-seconds", "5"])
        .arg("--output-dir")
        .arg(&blocker)
        .spawn()
        .unwrap();
    let status = wait_with_deadline(&mut child, Duration::from_secs(4));
    assert!(!status.success());
}

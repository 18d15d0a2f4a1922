use chrono::{Duration as ChronoDuration, Local};
use odo_core::{Broadcaster, Sample, Shutdown};
use odo_io::bridge::{spawn_bridge, BridgeConfig};
use odo_io::protocol::OutgoingMessage;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn loopback() -> BridgeConfig {
    BridgeConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

fn wait_for_subscribers(hub: &Broadcaster, count: usize) {
    let start = Instant::now();
    while hub.subscriber_count() != count {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "expected {count} subscribers, have {}",
            hub.subscriber_count()
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn client_receives_samples_with_running_distance() {
    let hub = Arc::new(Broadcaster::new(16));
    let shutdown = Shutdown::new();
    let bridge = spawn_bridge(Arc::clone(&hub), loopback(), shutdown.clone()).unwrap();

    let stream = TcpStream::connect(bridge.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    wait_for_subscribers(&hub, 1);

    let t0 = Local::now();
    hub.publish(&Sample::serial(t0, 10.0));
    hub.publish(&Sample::serial(t0 + ChronoDuration::seconds(2), 10.0));

    let mut reader = BufReader::new(stream);
    let mut received = Vec::new();
    for _ in 0..2 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        received.push(OutgoingMessage::parse(&line).expect("valid bridge line"));
    }

    match (&received[0], &received[1]) {
        (OutgoingMessage::SpeedUpdate(first), OutgoingMessage::SpeedUpdate(second)) => {
            assert_eq!(first.distance_cm, 0.0);
            assert_eq!(second.distance_cm, 20.0);
        }
        other => panic!("unexpected messages {other:?}"),
    }

    shutdown.trigger();
    hub.close();
    bridge.join();
}

#[test]
fn disconnected_client_is_unsubscribed() {
    let hub = Arc::new(Broadcaster::new(16));
    let shutdown = Shutdown::new();
    let bridge = spawn_bridge(Arc::clone(&hub), loopback(), shutdown.clone()).unwrap();

    let stream = TcpStream::connect(bridge.local_addr()).unwrap();
    wait_for_subscribers(&hub, 1);
    drop(stream);

    // The writer notices on its next write; a closed peer may accept one
    // write before the reset surfaces.
    let start = Instant::now();
    while hub.subscriber_count() > 0 {
        assert!(start.elapsed() < Duration::from_secs(5), "client never removed");
        hub.publish(&Sample::pulse(Local::now(), 60.0, 18.85));
        thread::sleep(Duration::from_millis(20));
    }

    shutdown.trigger();
    hub.close();
    bridge.join();
}

#[test]
fn bind_conflict_is_reported() {
    let hub = Arc::new(Broadcaster::new(4));
    let shutdown = Shutdown::new();
    let first = spawn_bridge(Arc::clone(&hub), loopback(), shutdown.clone()).unwrap();

    let taken = BridgeConfig {
        bind_addr: first.local_addr().to_string(),
        ..Default::default()
    };
    assert!(spawn_bridge(Arc::clone(&hub), taken, shutdown.clone()).is_err());

    shutdown.trigger();
    hub.close();
    first.join();
}

#[test]
fn shutdown_alone_ends_connected_writers() {
    let hub = Arc::new(Broadcaster::new(16));
    let shutdown = Shutdown::new();
    let bridge = spawn_bridge(Arc::clone(&hub), loopback(), shutdown.clone()).unwrap();

    let _client = TcpStream::connect(bridge.local_addr()).unwrap();
    wait_for_subscribers(&hub, 1);

    shutdown.trigger();
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        bridge.join();
        let _ = done_tx.send(());
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
        "bridge still running after shutdown"
    );
    assert_eq!(hub.subscriber_count(), 0);
    assert!(!hub.is_closed());
}

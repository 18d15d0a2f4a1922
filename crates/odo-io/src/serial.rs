//! Line sources for the serial path: a generic `BufRead` adapter used for
//! file replay and tests, and the UART-backed source built on `serialport`.

use odo_core::{LineEvent, LineSource, SourceError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::mem;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Newline-delimited lines from any buffered reader.
///
/// Bytes of an unfinished line survive a timed-out read and are completed by
/// the next call. A trailing line without terminator is returned once before
/// `Eof`.
pub struct ReaderLineSource<R> {
    name: String,
    reader: R,
    pending: Vec<u8>,
    pace: Option<Duration>,
}

impl<R: BufRead + Send> ReaderLineSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            pending: Vec::new(),
            pace: None,
        }
    }

    /// Sleep `interval` before handing out each line, so a recording plays
    /// back at roughly the rate the sensor produced it.
    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    fn complete_line(&mut self) -> LineEvent {
        if let Some(interval) = self.pace {
            thread::sleep(interval);
        }
        LineEvent::Line(mem::take(&mut self.pending))
    }
}

impl ReaderLineSource<BufReader<File>> {
    /// Replays a capture file through the serial path.
    ///
    /// Only regular files are accepted: reads here never time out, so a
    /// quiet pipe would stall the run past its idle timeout.
    pub fn open_replay(path: &Path) -> Result<Self, SourceError> {
        let name = path.display().to_string();
        let open_err = |reason: String| SourceError::Open {
            port: name.clone(),
            reason,
        };
        let metadata = std::fs::metadata(path).map_err(|e| open_err(e.to_string()))?;
        if !metadata.is_file() {
            return Err(open_err("not a regular file".to_string()));
        }
        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        info!(path = %name, "Replay source opened");
        Ok(Self::new(name, BufReader::new(file)))
    }
}

impl<R: BufRead + Send> LineSource for ReaderLineSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<LineEvent, SourceError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) if self.pending.is_empty() => return Ok(LineEvent::Eof),
                // read_until only stops short of the delimiter at end of input.
                Ok(_) => return Ok(self.complete_line()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    if !self.pending.is_empty() {
                        debug!(buffered = self.pending.len(), "Partial line held over");
                    }
                    return Ok(LineEvent::Timeout);
                }
                Err(source) => {
                    return Err(SourceError::Read {
                        port: self.name.clone(),
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(feature = "hardware-serial")]
pub use hardware::SerialLineSource;

#[cfg(feature = "hardware-serial")]
mod hardware {
    use super::ReaderLineSource;
    use odo_core::{LineEvent, LineSource, SourceError};
    use serialport::SerialPort;
    use std::io::{self, BufReader};
    use std::time::Duration;
    use tracing::info;

    /// UART sensor that prints one JSON object per line.
    pub struct SerialLineSource {
        inner: ReaderLineSource<BufReader<Box<dyn SerialPort>>>,
        timeout: Duration,
    }

    impl SerialLineSource {
        pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, SourceError> {
            let handle = serialport::new(port, baud_rate)
                .timeout(timeout)
                .open()
                .map_err(|e| SourceError::Open {
                    port: port.to_string(),
                    reason: e.to_string(),
                })?;
            info!(port, baud_rate, "Serial port opened");
            Ok(Self {
                inner: ReaderLineSource::new(port, BufReader::new(handle)),
                timeout,
            })
        }
    }

    impl LineSource for SerialLineSource {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn read_line(&mut self, timeout: Duration) -> Result<LineEvent, SourceError> {
            if timeout != self.timeout {
                self.inner
                    .get_mut()
                    .get_mut()
                    .set_timeout(timeout)
                    .map_err(|e| SourceError::Read {
                        port: self.inner.name().to_string(),
                        source: io::Error::other(e),
                    })?;
                self.timeout = timeout;
            }
            self.inner.read_line(timeout)
        }
    }
}

//! JSON-lines TCP bridge for live dashboards.
//!
//! Every accepted connection becomes one broadcast subscriber served by its
//! own writer thread. A failed write ends that client only; the pipeline
//! never waits on a socket.

use crate::metrics::BRIDGE_CLIENTS;
use crate::protocol::OutgoingMessage;
use odo_core::{Broadcaster, Odometer, Shutdown, Subscription};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const QUEUE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: String,
    /// A client that cannot take a line within this time is dropped.
    pub write_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            write_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind bridge on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure bridge socket: {0}")]
    Socket(#[from] io::Error),
}

pub struct BridgeHandle {
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the acceptor and every client writer. Writers finish on
    /// shutdown, when the broadcaster closes, or when their client goes away.
    pub fn join(self) {
        if self.acceptor.join().is_err() {
            warn!("Bridge acceptor panicked");
        }
    }
}

/// Binds the listener and starts accepting dashboard clients until
/// `shutdown` fires.
pub fn spawn_bridge(
    broadcaster: Arc<Broadcaster>,
    config: BridgeConfig,
    shutdown: Shutdown,
) -> Result<BridgeHandle, BridgeError> {
    let listener = TcpListener::bind(&config.bind_addr).map_err(|source| BridgeError::Bind {
        addr: config.bind_addr.clone(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "Bridge listening");

    let acceptor = thread::spawn(move || accept_loop(listener, broadcaster, config, shutdown));
    Ok(BridgeHandle {
        local_addr,
        acceptor,
    })
}

fn accept_loop(
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    config: BridgeConfig,
    shutdown: Shutdown,
) {
    let mut writers: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = prepare_stream(&stream, &config) {
                    warn!(client_addr = %addr, error = %e, "Rejecting bridge client");
                    continue;
                }
                // Subscribe before the writer starts so no sample slips by.
                let subscription = broadcaster.subscribe();
                info!(client_addr = %addr, subscriber = %subscription.id(), "Bridge client connected");
                let hub = Arc::clone(&broadcaster);
                let stop = shutdown.clone();
                writers.push(thread::spawn(move || {
                    serve_client(stream, addr, subscription, hub, stop)
                }));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                shutdown.wait_timeout(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(error = %e, "Bridge accept error");
                shutdown.wait_timeout(ACCEPT_POLL);
            }
        }
        writers.retain(|writer| !writer.is_finished());
    }

    debug!(clients = writers.len(), "Bridge stopped accepting");
    for writer in writers {
        let _ = writer.join();
    }
}

fn prepare_stream(stream: &TcpStream, config: &BridgeConfig) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(config.write_timeout))
}

/// Distance is integrated per client from its own first sample, so it can
/// differ from the controller's running total.
fn serve_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    mut subscription: Subscription,
    broadcaster: Arc<Broadcaster>,
    shutdown: Shutdown,
) {
    BRIDGE_CLIENTS.inc();
    let mut odometer = Odometer::new();
    let mut sent = 0u64;

    while let Some(sample) = subscription.recv_until(&shutdown, QUEUE_POLL) {
        let distance_cm = odometer.advance(&sample);
        let message = OutgoingMessage::from_sample(&sample, distance_cm);
        let line = match message.encode_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode bridge message");
                continue;
            }
        };
        if let Err(e) = stream.write_all(&line) {
            info!(client_addr = %addr, error = %e, "Bridge client disconnected");
            break;
        }
        sent += 1;
    }

    broadcaster.unsubscribe(subscription.id());
    BRIDGE_CLIENTS.dec();
    debug!(client_addr = %addr, sent, "Bridge writer finished");
}

//! # Ingestion Listener
//!
//! Long-running task that receives unsolicited state reports from devices and
//! upserts them into the registry.
//!
//! ## Failure Policy:
//! - **Malformed datagrams** are dropped silently (debug log only) and never
//!   reach the registry.
//! - **Bind or receive errors** are logged, the socket is dropped, and a fresh
//!   socket is bound after `rebind_delay`. The task never gives up on its own.
//! - **Store errors** from the upsert are logged; that report is lost but the
//!   listener keeps serving.
//!
//! The loop only ends when the shutdown channel fires or closes.
//!
//! Commands the controller broadcasts on the same port come back through
//! this listener too, and are recorded like any other report.

use crate::protocol::parse_report;
use crate::registry::Registry;
use crate::utils::{defaults, now_epoch_secs};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::sleep;

pub struct IngestionListener {
    registry: Arc<Registry>,
    bind_addr: SocketAddr,
    buffer_size: usize,
    rebind_delay: Duration,
}

impl IngestionListener {
    pub fn new(registry: Arc<Registry>, bind_addr: SocketAddr) -> Self {
        Self {
            registry,
            bind_addr,
            buffer_size: defaults::RECV_BUFFER_SIZE,
            rebind_delay: Duration::from_secs(defaults::REBIND_DELAY_SECS),
        }
    }

    /// Datagrams longer than this are truncated by the socket.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_rebind_delay(mut self, delay: Duration) -> Self {
        self.rebind_delay = delay;
        self
    }

    /// Binds `bind_addr` and serves until shutdown, re-binding after failures.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let socket = match UdpSocket::bind(self.bind_addr).await {
                Ok(socket) => socket,
                Err(e) => {
                    log::error!(
                        "Failed to bind UDP listener on {}: {}. Retrying in {:?}.",
                        self.bind_addr,
                        e,
                        self.rebind_delay
                    );
                    if self.wait_or_shutdown(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };
            if let Err(e) = socket.set_broadcast(true) {
                log::warn!("Failed to enable broadcast on listener socket: {}", e);
            }
            log::info!("Ingestion listener bound on {}", self.bind_addr);

            match self.serve(&socket, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    log::error!("UDP receive failed: {}. Re-binding in {:?}.", e, self.rebind_delay);
                    drop(socket);
                    if self.wait_or_shutdown(&mut shutdown).await {
                        break;
                    }
                }
            }
        }
        log::info!("Ingestion listener stopped.");
    }

    /// Serves an already-bound socket. Returns `Ok` on shutdown and the
    /// receive error otherwise.
    pub async fn run_with_socket(
        &self,
        socket: UdpSocket,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        self.serve(&socket, &mut shutdown).await
    }

    /// Parses one payload and records it. Returns `true` if the registry was
    /// updated.
    pub async fn handle_datagram(&self, payload: &[u8]) -> bool {
        let Some(report) = parse_report(payload) else {
            log::debug!("Dropping malformed datagram ({} bytes)", payload.len());
            return false;
        };

        let now = now_epoch_secs();
        match self.registry.upsert(&report.device_id, report.state, now).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to record report from '{}': {}", report.device_id, e);
                false
            }
        }
    }

    async fn serve(&self, socket: &UdpSocket, shutdown: &mut broadcast::Receiver<()>) -> std::io::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Ingestion listener received shutdown signal.");
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, src) = received?;
                    log::trace!("Datagram from {}: {} bytes", src, len);
                    self.handle_datagram(&buf[..len]).await;
                }
            }
        }
    }

    /// Sleeps `rebind_delay`. Returns `true` if shutdown arrived first.
    async fn wait_or_shutdown(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown.recv() => true,
            _ = sleep(self.rebind_delay) => false,
        }
    }
}

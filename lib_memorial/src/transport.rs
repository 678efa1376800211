//! # Broadcast Transport
//!
//! Fire-and-forget delivery of commands to the fleet. Every call opens its own
//! socket, sends one datagram to the broadcast address and drops the socket.
//! There is no acknowledgement, so success only means the datagram left.

use crate::error::TransportError;
use crate::model::Command;
use crate::protocol::encode_command;
use crate::utils::defaults;
use std::net::{SocketAddr, UdpSocket};

/// Outbound command seam. The scheduler calls this while holding the registry
/// lock, so implementations must not block for long.
pub trait CommandTransport: Send + Sync {
    fn send(&self, device_id: &str, cmd: Command) -> Result<(), TransportError>;
}

/// # UDP Broadcaster
///
/// Sends `<device_id>,<cmd>` to `target`, `255.255.255.255:4210` by default.
#[derive(Debug, Clone)]
pub struct UdpBroadcaster {
    target: SocketAddr,
}

impl UdpBroadcaster {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    fn io_err(&self, source: std::io::Error) -> TransportError {
        TransportError::Io {
            target: self.target.to_string(),
            source,
        }
    }
}

impl Default for UdpBroadcaster {
    fn default() -> Self {
        let addr: std::net::Ipv4Addr = defaults::BROADCAST_ADDR
            .parse()
            .unwrap_or(std::net::Ipv4Addr::BROADCAST);
        Self::new(SocketAddr::from((addr, defaults::UDP_PORT)))
    }
}

impl CommandTransport for UdpBroadcaster {
    fn send(&self, device_id: &str, cmd: Command) -> Result<(), TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| self.io_err(e))?;
        socket.set_broadcast(true).map_err(|e| self.io_err(e))?;

        let msg = encode_command(device_id, cmd);
        socket.send_to(msg.as_bytes(), self.target).map_err(|e| self.io_err(e))?;
        log::debug!("Sent '{}' to {}", msg, self.target);
        Ok(())
    }
}

//! Network module - UDP transport shared by discovery and command traffic
//!
//! Provides:
//! - The station context object (socket, registry, control state)
//! - The transport loop pumping inbound datagrams
//! - The command dispatcher used by the operator console

mod context;
mod dispatcher;
mod station;
mod transport;

pub use context::*;
pub use dispatcher::*;
pub use station::*;
pub use transport::*;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::protocol::{Mode, BASE_CHANNEL, DISCOVERY_PORT};

/// Runtime configuration for a station
#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Port peers broadcast announcements to; 0 picks an ephemeral port
    pub discovery_port: u16,
    /// First channel handed to a peer
    pub base_channel: u16,
    /// Interface to bind to
    pub bind_address: IpAddr,
    /// Upper bound on one transport loop tick
    pub read_timeout: Duration,
    /// Silence after which a peer is evicted
    pub liveness_window: Duration,
    /// Enable SO_BROADCAST on the socket
    pub broadcast: bool,
    /// Pause between the final stop broadcast and closing the socket
    pub shutdown_grace: Duration,
    /// Mode the station starts in
    pub initial_mode: Mode,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            base_channel: BASE_CHANNEL,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            read_timeout: Duration::from_millis(100),
            liveness_window: Duration::from_secs(10),
            broadcast: true,
            shutdown_grace: Duration::from_millis(500),
            initial_mode: Mode::Standby,
        }
    }
}

impl StationConfig {
    pub fn new(discovery_port: u16) -> Self {
        Self {
            discovery_port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.discovery_port)
    }
}

/// Outbound half of the transport
///
/// Implemented by the shared UDP socket; tests substitute a recorder.
#[async_trait]
pub trait DatagramSink: Send + Sync {
    /// Send one datagram to `target`
    async fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl DatagramSink for UdpSocket {
    async fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.send_to(payload, target).await
    }
}

/// Create the shared, non-exclusive datagram socket
pub fn bind_socket(addr: SocketAddr, broadcast: bool) -> io::Result<std::net::UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

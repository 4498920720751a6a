//! Shared station state
//!
//! One context object is handed to the transport loop and to every
//! dispatcher clone. The registry sits behind a single mutex so liveness
//! updates and eviction sweeps never interleave.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use super::DatagramSink;
use crate::protocol::Mode;
use crate::registry::PeerRegistry;

/// Events emitted by the station
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    /// Transport loop is running
    Started {
        local_addr: SocketAddr,
    },
    /// A new peer announced itself and got a channel
    PeerDiscovered {
        peer_id: String,
        address: IpAddr,
        channel: u16,
    },
    /// A peer timed out or was cleared; drop any pairing for it
    PeerEvicted {
        peer_id: String,
    },
    ModeChanged {
        mode: Mode,
    },
    StopChanged {
        engaged: bool,
    },
    /// Transport loop exited
    Stopped,
}

/// Global mode and emergency stop flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub mode: Mode,
    pub stop_engaged: bool,
}

impl ControlState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            stop_engaged: false,
        }
    }

    /// Control frames only flow while active and not stopped
    pub fn forwards_control(&self) -> bool {
        self.mode == Mode::Active && !self.stop_engaged
    }
}

/// State shared by the transport loop and the command dispatcher
pub struct StationContext {
    pub(crate) sink: Arc<dyn DatagramSink>,
    pub(crate) registry: Mutex<PeerRegistry>,
    pub(crate) control: RwLock<ControlState>,
    /// Port used for replies when an announcement names none, and as the
    /// second target of stop broadcasts
    pub(crate) discovery_port: u16,
    event_tx: mpsc::UnboundedSender<StationEvent>,
}

impl StationContext {
    pub fn new(
        sink: Arc<dyn DatagramSink>,
        discovery_port: u16,
        base_channel: u16,
        initial_mode: Mode,
    ) -> (Self, mpsc::UnboundedReceiver<StationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let context = Self {
            sink,
            registry: Mutex::new(PeerRegistry::new(base_channel)),
            control: RwLock::new(ControlState::new(initial_mode)),
            discovery_port,
            event_tx,
        };
        (context, event_rx)
    }

    pub fn discovery_port(&self) -> u16 {
        self.discovery_port
    }

    /// Queue an event without ever blocking the caller
    ///
    /// The queue is unbounded so a slow consumer never loses an eviction;
    /// events are only discarded once the receiver is gone.
    pub(crate) fn emit(&self, event: StationEvent) {
        if let Err(e) = self.event_tx.send(event) {
            tracing::debug!("Station event dropped, receiver closed: {:?}", e.0);
        }
    }

    /// Send one datagram, logging instead of failing
    pub(crate) async fn send(&self, payload: &[u8], target: SocketAddr) -> bool {
        match self.sink.send_datagram(payload, target).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(%target, "Send failed: {}", e);
                false
            }
        }
    }
}

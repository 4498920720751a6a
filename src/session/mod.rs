//! Session manager
//!
//! Per-peer protocol state machine: `Unknown -> Announced -> Channeled`.
//! Consumes decoded inbound messages, mutates the registry and produces the
//! replies the transport loop has to send. Holds no state of its own.

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::{encode, Message};
use crate::registry::PeerRegistry;

/// Where a peer stands in the discovery handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Never announced, or evicted
    Unknown,
    /// In the registry, no assignment sent yet
    Announced,
    /// Assignment sent at least once
    Channeled,
}

/// A channel assignment waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub peer_id: String,
    pub channel: u16,
    /// True when the announcement created the peer
    pub is_new: bool,
    /// Reported address and port from the announcement
    pub target: SocketAddr,
    pub payload: Bytes,
}

/// Protocol state machine
#[derive(Debug, Clone)]
pub struct SessionManager {
    /// Reply port for announcements that do not name one
    discovery_port: u16,
    liveness_window: Duration,
}

impl SessionManager {
    pub fn new(discovery_port: u16, liveness_window: Duration) -> Self {
        Self {
            discovery_port,
            liveness_window,
        }
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Apply one inbound message
    ///
    /// Only announcements change the registry. Every announcement, new or
    /// repeated, yields the peer's assignment so a peer that missed it
    /// recovers on its next cycle. The reply goes to the address and port
    /// the peer reported, not to `source`.
    pub fn handle(
        &self,
        registry: &mut PeerRegistry,
        message: Message,
        source: SocketAddr,
        now: Instant,
    ) -> Option<Assignment> {
        match message {
            Message::Announcement { peer_id, address, port } => {
                let reply_port = port.unwrap_or(self.discovery_port);
                let (peer, is_new) = match registry.upsert(&peer_id, address, reply_port, now) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(peer = %peer_id, %source, "Dropping announcement: {}", e);
                        return None;
                    }
                };

                if is_new {
                    tracing::info!(
                        peer = %peer.id,
                        address = %address,
                        channel = peer.channel,
                        "Discovered peer"
                    );
                } else {
                    tracing::debug!(peer = %peer.id, %source, "Peer re-announced");
                }

                let channel = peer.channel;
                let reply = Message::Assignment {
                    peer_id: peer_id.clone(),
                    channel,
                };
                let payload = match encode(&reply) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(peer = %peer_id, "Cannot encode assignment: {}", e);
                        return None;
                    }
                };

                Some(Assignment {
                    peer_id,
                    channel,
                    is_new,
                    target: SocketAddr::new(address, reply_port),
                    payload,
                })
            }
            // Console-bound traffic never refreshes liveness
            Message::Assignment { .. }
            | Message::Status { .. }
            | Message::Stop { .. }
            | Message::Control(_) => {
                tracing::trace!(kind = message.kind(), %source, "Ignoring peer-bound message");
                None
            }
            Message::Unrecognized => {
                tracing::trace!(%source, "Dropping unrecognized datagram");
                None
            }
        }
    }

    /// Move the peer to `Channeled` once its assignment actually left
    pub fn assignment_sent(&self, registry: &mut PeerRegistry, assignment: &Assignment) {
        if registry.mark_connected(&assignment.peer_id) {
            tracing::debug!(
                peer = %assignment.peer_id,
                channel = assignment.channel,
                target = %assignment.target,
                "Assignment sent"
            );
        }
    }

    /// Evict peers silent for longer than the liveness window
    pub fn sweep(&self, registry: &mut PeerRegistry, now: Instant) -> Vec<String> {
        let evicted = registry.evict_stale(now, self.liveness_window);
        for peer_id in &evicted {
            tracing::info!(peer = %peer_id, "Peer timed out");
        }
        evicted
    }

    pub fn state_of(&self, registry: &PeerRegistry, peer_id: &str) -> PeerState {
        match registry.get(peer_id) {
            None => PeerState::Unknown,
            Some(peer) if peer.connected => PeerState::Channeled,
            Some(_) => PeerState::Announced,
        }
    }
}

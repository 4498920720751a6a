//! Transport loop
//!
//! Single receive/dispatch cycle bound to the shared socket. Each tick waits
//! at most one read timeout for a datagram, feeds it to the session manager,
//! sends any reply and then runs the eviction sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time;

use super::context::{StationContext, StationEvent};
use crate::protocol::{decode, Message, MAX_DATAGRAM_SIZE};
use crate::session::SessionManager;

/// Inbound half of the station
pub struct TransportLoop {
    socket: Arc<UdpSocket>,
    context: Arc<StationContext>,
    session: SessionManager,
    read_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl TransportLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        context: Arc<StationContext>,
        session: SessionManager,
        read_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            socket,
            context,
            session,
            read_timeout,
            shutdown,
        }
    }

    /// Run until the shutdown flag is raised or its sender is dropped
    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        tracing::debug!(
            timeout_ms = self.read_timeout.as_millis() as u64,
            window_secs = self.session.liveness_window().as_secs(),
            "Transport loop running"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    None
                }
                result = time::timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => {
                    match result {
                        Ok(Ok((len, source))) => Some((len, source)),
                        Ok(Err(e)) => {
                            // e.g. ICMP port unreachable surfacing on the next read
                            tracing::warn!("Receive failed: {}", e);
                            None
                        }
                        Err(_) => None,
                    }
                }
            };

            if let Some((len, source)) = received {
                self.handle_datagram(&buf[..len], source).await;
            }

            self.sweep(Instant::now()).await;
        }

        tracing::info!("Transport loop stopped");
        self.context.emit(StationEvent::Stopped);
    }

    async fn handle_datagram(&self, datagram: &[u8], source: SocketAddr) {
        let message = decode(datagram);
        tracing::debug!(
            kind = message.kind(),
            peer = message.peer_id().unwrap_or("-"),
            %source,
            len = datagram.len(),
            "Datagram received"
        );

        if matches!(message, Message::Unrecognized) {
            return;
        }

        let mut registry = self.context.registry.lock().await;
        let Some(assignment) = self
            .session
            .handle(&mut registry, message, source, Instant::now())
        else {
            return;
        };

        if assignment.is_new {
            if let Some(peer) = registry.get(&assignment.peer_id) {
                self.context.emit(StationEvent::PeerDiscovered {
                    peer_id: peer.id.clone(),
                    address: peer.address,
                    channel: peer.channel,
                });
            }
        }

        // Lock held across the send so a sweep cannot remove the peer
        // between the assignment leaving and the peer being flagged
        if self.context.send(&assignment.payload, assignment.target).await {
            self.session.assignment_sent(&mut registry, &assignment);
        }
    }

    async fn sweep(&self, now: Instant) {
        let evicted = {
            let mut registry = self.context.registry.lock().await;
            self.session.sweep(&mut registry, now)
        };

        for peer_id in evicted {
            self.context.emit(StationEvent::PeerEvicted { peer_id });
        }
    }
}

//! Command dispatcher
//!
//! Outbound API for the operator console: mode and stop broadcasts, and the
//! per-tick control frames for paired peers. Send failures are logged and
//! skipped so one unreachable peer never stalls the others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::context::{ControlState, StationContext, StationEvent};
use crate::input::ControlSample;
use crate::protocol::{encode, ControlFrame, Message, Mode};
use crate::registry::PeerSnapshot;

/// Cloneable handle for issuing commands to peers
#[derive(Clone)]
pub struct CommandDispatcher {
    context: Arc<StationContext>,
}

impl CommandDispatcher {
    pub fn new(context: Arc<StationContext>) -> Self {
        Self { context }
    }

    pub async fn control_state(&self) -> ControlState {
        *self.context.control.read().await
    }

    pub async fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.context.registry.lock().await.snapshot(Instant::now())
    }

    /// Send `<id>:<mode>` to every known peer's channel
    ///
    /// Returns the number of datagrams that left the socket.
    pub async fn broadcast_status(&self, mode: Mode) -> usize {
        let targets: Vec<(String, SocketAddr)> = {
            let registry = self.context.registry.lock().await;
            registry
                .all()
                .into_iter()
                .map(|peer| (peer.id.clone(), peer.channel_addr()))
                .collect()
        };

        let mut sent = 0;
        for (peer_id, target) in targets {
            let payload = match encode(&Message::status(peer_id.as_str(), mode)) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(peer = %peer_id, "Cannot encode status: {}", e);
                    continue;
                }
            };
            if self.context.send(&payload, target).await {
                sent += 1;
            }
        }

        tracing::debug!(%mode, sent, "Status broadcast");
        sent
    }

    /// Send the stop or resume literal to every known peer
    ///
    /// Each peer gets it twice: on the discovery port and on its channel,
    /// covering peers that have not switched to their channel yet.
    pub async fn broadcast_stop(&self, engage: bool) -> usize {
        let discovery_port = self.context.discovery_port;
        let targets: Vec<SocketAddr> = {
            let registry = self.context.registry.lock().await;
            registry
                .all()
                .into_iter()
                .flat_map(|peer| {
                    [
                        SocketAddr::new(peer.address, discovery_port),
                        peer.channel_addr(),
                    ]
                })
                .collect()
        };

        let payload = match encode(&Message::Stop { engaged: engage }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Cannot encode stop: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for target in targets {
            if self.context.send(&payload, target).await {
                sent += 1;
            }
        }

        tracing::debug!(engage, sent, "Stop broadcast");
        sent
    }

    /// Forward one controller sample to a peer
    ///
    /// Silently does nothing unless the station is active, the stop is
    /// released and the peer has been sent its channel. Returns whether a
    /// frame was sent.
    pub async fn send_control_frame(&self, peer_id: &str, sample: &ControlSample) -> bool {
        let control = self.control_state().await;
        if !control.forwards_control() {
            tracing::trace!(peer = %peer_id, mode = %control.mode, stop = control.stop_engaged, "Control frame held back");
            return false;
        }

        let target = {
            let registry = self.context.registry.lock().await;
            match registry.get(peer_id) {
                Some(peer) if peer.connected => peer.channel_addr(),
                Some(_) => {
                    tracing::trace!(peer = %peer_id, "Control frame for unconnected peer");
                    return false;
                }
                None => return false,
            }
        };

        let frame = ControlFrame::new(peer_id, sample.axes, sample.buttons);
        match encode(&Message::Control(frame)) {
            Ok(payload) => self.context.send(&payload, target).await,
            Err(e) => {
                tracing::warn!(peer = %peer_id, "Cannot encode control frame: {}", e);
                false
            }
        }
    }

    /// Switch the global mode and tell every peer
    pub async fn set_mode(&self, mode: Mode) -> usize {
        self.context.control.write().await.mode = mode;
        tracing::info!(%mode, "Mode changed");
        self.context.emit(StationEvent::ModeChanged { mode });
        self.broadcast_status(mode).await
    }

    /// Engage or release the emergency stop and tell every peer
    pub async fn set_stop(&self, engage: bool) -> usize {
        self.context.control.write().await.stop_engaged = engage;
        tracing::info!(engaged = engage, "Emergency stop changed");
        self.context.emit(StationEvent::StopChanged { engaged: engage });
        self.broadcast_stop(engage).await
    }

    /// Flip the emergency stop, returning the new state
    pub async fn toggle_stop(&self) -> bool {
        let engage = {
            let mut control = self.context.control.write().await;
            control.stop_engaged = !control.stop_engaged;
            control.stop_engaged
        };
        tracing::info!(engaged = engage, "Emergency stop changed");
        self.context.emit(StationEvent::StopChanged { engaged: engage });
        self.broadcast_stop(engage).await;
        engage
    }

    /// Forget every peer so they have to announce again
    ///
    /// Channel numbering continues; evictions are reported as events.
    pub async fn refresh(&self) -> Vec<String> {
        let removed = self.context.registry.lock().await.clear();
        tracing::info!(count = removed.len(), "Peer list cleared");
        for peer_id in &removed {
            self.context.emit(StationEvent::PeerEvicted {
                peer_id: peer_id.clone(),
            });
        }
        removed
    }
}

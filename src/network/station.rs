//! Station lifecycle
//!
//! Binds the shared socket, spawns the transport loop and tears both down
//! again. Binding is the only step that can fail hard.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::context::{ControlState, StationContext, StationEvent};
use super::dispatcher::CommandDispatcher;
use super::transport::TransportLoop;
use super::{bind_socket, StationConfig};
use crate::registry::PeerSnapshot;
use crate::session::SessionManager;

/// Station errors
#[derive(Error, Debug)]
pub enum StationError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Station already running")]
    AlreadyRunning,

    #[error("Station not running")]
    NotRunning,
}

pub type StationResult<T> = Result<T, StationError>;

/// The console's network core
pub struct Station {
    config: StationConfig,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    context: Arc<StationContext>,
    event_rx: Option<mpsc::UnboundedReceiver<StationEvent>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Station {
    /// Bind the shared socket; must be called inside a Tokio runtime
    pub fn bind(config: StationConfig) -> StationResult<Self> {
        let addr = config.bind_addr();
        let socket = bind_socket(addr, config.broadcast)
            .map_err(|source| StationError::Bind { addr, source })?;
        let socket = Arc::new(UdpSocket::from_std(socket)?);
        let local_addr = socket.local_addr()?;

        tracing::info!("Station bound to {}", local_addr);

        // An ephemeral bind stands in for the discovery port
        let (context, event_rx) = StationContext::new(
            socket.clone(),
            local_addr.port(),
            config.base_channel,
            config.initial_mode,
        );

        Ok(Self {
            config,
            socket,
            local_addr,
            context: Arc::new(context),
            event_rx: Some(event_rx),
            shutdown_tx: None,
            task: None,
        })
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<StationEvent>> {
        self.event_rx.take()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the transport loop
    pub fn start(&mut self) -> StationResult<()> {
        if self.task.is_some() {
            return Err(StationError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = SessionManager::new(self.context.discovery_port(), self.config.liveness_window);
        let transport = TransportLoop::new(
            self.socket.clone(),
            self.context.clone(),
            session,
            self.config.read_timeout,
            shutdown_rx,
        );

        self.context.emit(StationEvent::Started {
            local_addr: self.local_addr,
        });
        self.task = Some(tokio::spawn(transport.run()));
        self.shutdown_tx = Some(shutdown_tx);

        tracing::info!("Station started");
        Ok(())
    }

    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(self.context.clone())
    }

    pub async fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.dispatcher().snapshot().await
    }

    pub async fn control_state(&self) -> ControlState {
        self.dispatcher().control_state().await
    }

    /// Stop every peer, then stop the transport loop
    ///
    /// The final stop broadcast is best-effort and followed by the
    /// configured grace period before the loop is signalled.
    pub async fn shutdown(mut self) -> StationResult<()> {
        let dispatcher = self.dispatcher();
        dispatcher.set_stop(true).await;
        tokio::time::sleep(self.config.shutdown_grace).await;

        let (Some(shutdown_tx), Some(task)) = (self.shutdown_tx.take(), self.task.take()) else {
            return Err(StationError::NotRunning);
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = task.await {
            tracing::warn!("Transport loop ended abnormally: {}", e);
        }

        tracing::info!("Station shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ControlSample;
    use crate::protocol::{Mode, BASE_CHANNEL};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn test_config() -> StationConfig {
        StationConfig::new(0)
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_read_timeout(Duration::from_millis(20))
            .with_shutdown_grace(Duration::from_millis(10))
    }

    async fn peer_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<StationEvent>) -> StationEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        // TEST-NET-1 is never assigned to a local interface
        let config = StationConfig::new(40123).with_bind_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        match Station::bind(config) {
            Err(StationError::Bind { addr, .. }) => assert_eq!(addr.port(), 40123),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("bind to a foreign address should fail"),
        }
    }

    #[tokio::test]
    async fn test_announce_assign_roundtrip() {
        let mut station = Station::bind(test_config()).unwrap();
        assert_eq!(station.config().base_channel, BASE_CHANNEL);
        let mut events = station.take_event_receiver().unwrap();
        station.start().unwrap();
        assert!(matches!(next_event(&mut events).await, StationEvent::Started { .. }));

        let peer = peer_socket().await;
        let peer_port = peer.local_addr().unwrap().port();
        let announce = format!("ANNOUNCE:R1:127.0.0.1:{}", peer_port);
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();

        assert_eq!(recv_text(&peer).await, format!("ASSIGN:R1:{}", BASE_CHANNEL));
        assert_eq!(
            next_event(&mut events).await,
            StationEvent::PeerDiscovered {
                peer_id: "R1".to_string(),
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                channel: BASE_CHANNEL,
            }
        );

        // Repeated announcement gets the same channel again
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();
        assert_eq!(recv_text(&peer).await, format!("ASSIGN:R1:{}", BASE_CHANNEL));

        let snapshot = station.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].connected);

        station.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_does_not_stop_the_loop() {
        let mut station = Station::bind(test_config()).unwrap();
        station.start().unwrap();

        let peer = peer_socket().await;
        let peer_port = peer.local_addr().unwrap().port();
        for junk in [&b"\xff\xfe\x00"[..], b"hello", b"ANNOUNCE:broken", b""] {
            peer.send_to(junk, station.local_addr()).await.unwrap();
        }
        let announce = format!("ANNOUNCE:R9:127.0.0.1:{}", peer_port);
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();

        assert_eq!(recv_text(&peer).await, format!("ASSIGN:R9:{}", BASE_CHANNEL));
        assert!(station.is_running());
        station.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_peer_is_evicted() {
        let config = test_config().with_liveness_window(Duration::from_millis(100));
        let mut station = Station::bind(config).unwrap();
        let mut events = station.take_event_receiver().unwrap();
        station.start().unwrap();

        let peer = peer_socket().await;
        let announce = format!("ANNOUNCE:R1:127.0.0.1:{}", peer.local_addr().unwrap().port());
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();
        recv_text(&peer).await;

        loop {
            match next_event(&mut events).await {
                StationEvent::PeerEvicted { peer_id } => {
                    assert_eq!(peer_id, "R1");
                    break;
                }
                _ => continue,
            }
        }
        assert!(station.snapshot().await.is_empty());
        station.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_control_frames_reach_peer_channel() {
        let mut station = Station::bind(test_config()).unwrap();
        station.start().unwrap();

        let peer = peer_socket().await;
        let announce = format!("ANNOUNCE:R1:127.0.0.1:{}", peer.local_addr().unwrap().port());
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();
        recv_text(&peer).await;

        // Nothing listens on the channel; the send must still not error out
        let dispatcher = station.dispatcher();
        dispatcher.set_mode(Mode::Active).await;
        assert!(dispatcher.send_control_frame("R1", &ControlSample::neutral()).await);

        station.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_sends_final_stop() {
        let mut station = Station::bind(test_config()).unwrap();
        let mut events = station.take_event_receiver().unwrap();
        station.start().unwrap();

        let peer = peer_socket().await;
        let announce = format!("ANNOUNCE:R1:127.0.0.1:{}", peer.local_addr().unwrap().port());
        peer.send_to(announce.as_bytes(), station.local_addr()).await.unwrap();
        recv_text(&peer).await;

        station.shutdown().await.unwrap();

        let mut saw_stop = false;
        let mut saw_stopped = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            match event {
                StationEvent::StopChanged { engaged } => saw_stop = engaged,
                StationEvent::Stopped => saw_stopped = true,
                _ => {}
            }
        }
        assert!(saw_stop);
        assert!(saw_stopped);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut station = Station::bind(test_config()).unwrap();
        station.start().unwrap();
        assert!(matches!(station.start(), Err(StationError::AlreadyRunning)));
        station.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let station = Station::bind(test_config()).unwrap();
        assert!(matches!(station.shutdown().await, Err(StationError::NotRunning)));
    }
}

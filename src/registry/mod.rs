//! Peer registry
//!
//! Authoritative table of announced peers. Owns channel allocation and the
//! liveness eviction policy. Not synchronized itself; the station keeps it
//! behind a single mutex.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No channels left to assign (next would be {0})")]
    ChannelsExhausted(u32),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// A discovered peer
#[derive(Debug, Clone)]
pub struct Peer {
    /// Identifier chosen by the peer; first announcement wins
    pub id: String,
    /// Address reported in the first announcement
    pub address: IpAddr,
    /// Port the peer asked its assignment to be sent to
    pub announce_port: u16,
    /// Port allocated for unicast traffic to this peer
    pub channel: u16,
    /// Most recent announcement
    pub last_seen: Instant,
    /// Whether an assignment has been sent at least once
    pub connected: bool,
}

impl Peer {
    /// Where status and control traffic for this peer goes
    pub fn channel_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.channel)
    }

    fn touch(&mut self, now: Instant) {
        if now > self.last_seen {
            self.last_seen = now;
        }
    }
}

/// Read-only view of a peer handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    pub id: String,
    pub address: IpAddr,
    pub channel: u16,
    pub connected: bool,
    /// Milliseconds since the last announcement
    pub last_seen_ms: u64,
}

/// In-memory table of known peers
#[derive(Debug)]
pub struct PeerRegistry {
    peers: HashMap<String, Peer>,
    /// Next channel to hand out; only ever grows
    next_channel: u32,
}

impl PeerRegistry {
    pub fn new(base_channel: u16) -> Self {
        Self {
            peers: HashMap::new(),
            next_channel: u32::from(base_channel),
        }
    }

    /// Record an announcement, creating the peer if its id is unseen
    ///
    /// Known peers keep their address and channel; only `last_seen` moves.
    pub fn upsert(
        &mut self,
        id: &str,
        reported_address: IpAddr,
        reported_port: u16,
        now: Instant,
    ) -> RegistryResult<(&Peer, bool)> {
        match self.peers.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                let peer = entry.into_mut();
                peer.touch(now);
                Ok((peer, false))
            }
            Entry::Vacant(entry) => {
                let channel = allocate_channel(&mut self.next_channel)?;
                let peer = entry.insert(Peer {
                    id: id.to_string(),
                    address: reported_address,
                    announce_port: reported_port,
                    channel,
                    last_seen: now,
                    connected: false,
                });
                Ok((peer, true))
            }
        }
    }

    /// Flag a peer once its assignment has gone out
    pub fn mark_connected(&mut self, id: &str) -> bool {
        match self.peers.get_mut(id) {
            Some(peer) => {
                peer.connected = true;
                true
            }
            None => false,
        }
    }

    /// Remove every peer silent for longer than `window`
    pub fn evict_stale(&mut self, now: Instant, window: Duration) -> Vec<String> {
        let mut evicted: Vec<String> = self
            .peers
            .values()
            .filter(|peer| now.saturating_duration_since(peer.last_seen) > window)
            .map(|peer| peer.id.clone())
            .collect();
        evicted.sort();

        for id in &evicted {
            self.peers.remove(id);
        }
        evicted
    }

    /// Drop every peer; channel numbering continues where it left off
    pub fn clear(&mut self) -> Vec<String> {
        let mut removed: Vec<String> = self.peers.drain().map(|(id, _)| id).collect();
        removed.sort();
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// All peers in channel order
    pub fn all(&self) -> Vec<&Peer> {
        let mut peers: Vec<&Peer> = self.peers.values().collect();
        peers.sort_by_key(|peer| peer.channel);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn snapshot(&self, now: Instant) -> Vec<PeerSnapshot> {
        self.all()
            .into_iter()
            .map(|peer| PeerSnapshot {
                id: peer.id.clone(),
                address: peer.address,
                channel: peer.channel,
                connected: peer.connected,
                last_seen_ms: now.saturating_duration_since(peer.last_seen).as_millis() as u64,
            })
            .collect()
    }
}

fn allocate_channel(next_channel: &mut u32) -> RegistryResult<u16> {
    let channel = u16::try_from(*next_channel)
        .map_err(|_| RegistryError::ChannelsExhausted(*next_channel))?;
    *next_channel += 1;
    Ok(channel)
}

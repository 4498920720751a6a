//! Peer to input device pairing
//!
//! Kept presentation-side and keyed by peer id. Entries must be dropped
//! when the station reports a peer as evicted.

use std::collections::BTreeMap;

use crate::input::{ControlSample, DeviceId, DeviceSample};

/// Which input device drives which peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairings {
    by_peer: BTreeMap<String, DeviceId>,
}

impl Pairings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair a peer with a device, replacing any earlier device for that peer
    pub fn pair(&mut self, peer_id: impl Into<String>, device: DeviceId) -> Option<DeviceId> {
        self.by_peer.insert(peer_id.into(), device)
    }

    pub fn unpair(&mut self, peer_id: &str) -> Option<DeviceId> {
        self.by_peer.remove(peer_id)
    }

    /// Forget an evicted peer
    pub fn drop_peer(&mut self, peer_id: &str) -> bool {
        self.by_peer.remove(peer_id).is_some()
    }

    pub fn clear(&mut self) {
        self.by_peer.clear();
    }

    pub fn device_for(&self, peer_id: &str) -> Option<DeviceId> {
        self.by_peer.get(peer_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DeviceId)> {
        self.by_peer.iter().map(|(peer, device)| (peer.as_str(), *device))
    }

    /// Pair each peer with the latest sample of its device
    ///
    /// Peers whose device produced no sample this tick are skipped.
    pub fn frames<'a>(
        &'a self,
        samples: &'a [DeviceSample],
    ) -> impl Iterator<Item = (&'a str, &'a ControlSample)> + 'a {
        self.iter().filter_map(move |(peer_id, device)| {
            samples
                .iter()
                .find(|s| s.device == device)
                .map(|s| (peer_id, &s.sample))
        })
    }
}

impl FromIterator<(String, DeviceId)> for Pairings {
    fn from_iter<I: IntoIterator<Item = (String, DeviceId)>>(iter: I) -> Self {
        Self {
            by_peer: iter.into_iter().collect(),
        }
    }
}

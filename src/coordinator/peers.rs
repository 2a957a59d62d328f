use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Liveness record for a connected peer
#[derive(Debug, Clone)]
pub struct PeerState {
    pub id: String,
    pub team_id: String,
    pub last_seen: Instant,
    pub connected_at: DateTime<Utc>,
}

impl PeerState {
    pub fn new(id: String, team_id: String) -> Self {
        Self {
            id,
            team_id,
            last_seen: Instant::now(),
            connected_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_alive(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < timeout
    }
}

/// Tracks which peers are connected and recently heard from
#[derive(Debug)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, PeerState>>,
    timeout: Duration,
}

impl PeerRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a peer, replacing any earlier record under the same id
    pub fn register(&self, team_id: &str, peer_id: &str) {
        self.peers.write().insert(
            peer_id.to_string(),
            PeerState::new(peer_id.to_string(), team_id.to_string()),
        );
        tracing::info!(peer_id, team_id, "Peer registered");
    }

    /// Refresh liveness. Returns false for unknown peers.
    pub fn touch(&self, peer_id: &str) -> bool {
        match self.peers.write().get_mut(peer_id) {
            Some(peer) => {
                peer.touch();
                true
            }
            None => false,
        }
    }

    pub fn unregister(&self, peer_id: &str) -> Option<PeerState> {
        let removed = self.peers.write().remove(peer_id);
        if removed.is_some() {
            tracing::info!(peer_id, "Peer unregistered");
        }
        removed
    }

    /// Alive peers of `team_id`, sorted by id
    pub fn available_for_team(&self, team_id: &str, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .peers
            .read()
            .values()
            .filter(|p| p.team_id == team_id && p.is_alive(now, self.timeout))
            .map(|p| p.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn team_of(&self, peer_id: &str) -> Option<String> {
        self.peers.read().get(peer_id).map(|p| p.team_id.clone())
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerState> {
        self.peers.read().get(peer_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

//! Test harness for coordinator integration tests.
//!
//! Builds a coordinator wired to an in-process peer hub and connects peers
//! the way the WebSocket handler does, exposing each peer's outbound channel.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crackteam::collab::AllowAll;
use crackteam::config::CoordinatorConfig;
use crackteam::coordinator::{Coordinator, CrackRequest, CreateOutcome, HashTypeInfo, JobId};
use crackteam::transport::{Message, PeerHub};

pub const TEAM: &str = "team_red";

/// Config with throttling disabled so every progress change is broadcast.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_progress_interval_ms(0)
        .with_stale_after_ms(30_000)
}

pub struct TestPeer {
    pub peer_id: String,
    pub conn_id: Uuid,
    pub rx: UnboundedReceiver<Message>,
}

impl TestPeer {
    /// Everything delivered so far.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Chunks handed to this peer among `messages`, as `(job_id, chunk)`.
    pub fn assignments(messages: &[Message]) -> Vec<(JobId, String)> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::JobAssignment {
                    job_id,
                    wordlist_chunk,
                    ..
                } => Some((*job_id, wordlist_chunk.to_string())),
                _ => None,
            })
            .collect()
    }
}

pub struct TestTeam {
    pub coordinator: Arc<Coordinator>,
    pub hub: Arc<PeerHub>,
}

impl TestTeam {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let hub = Arc::new(PeerHub::new());
        let coordinator = Arc::new(Coordinator::new(config, hub.clone(), Arc::new(AllowAll)));
        Self { coordinator, hub }
    }

    /// Open a hub connection and register the peer with the coordinator.
    pub async fn connect(&self, peer_id: &str) -> TestPeer {
        let (conn_id, rx) = self.hub.connect(TEAM, peer_id).await;
        self.coordinator
            .connect_peer(TEAM, peer_id)
            .await
            .expect("peer registration");
        TestPeer {
            peer_id: peer_id.to_string(),
            conn_id,
            rx,
        }
    }

    /// Close the hub connection and reclaim the peer's work.
    pub async fn disconnect(&self, peer: &TestPeer) -> usize {
        assert!(self.hub.disconnect(&peer.peer_id, peer.conn_id).await);
        self.coordinator.disconnect_peer(&peer.peer_id).await
    }

    pub async fn submit(&self, hash: &str, wordlists: &[&str]) -> CreateOutcome {
        self.coordinator
            .create_job(request(hash, wordlists))
            .await
            .expect("job creation")
    }
}

pub fn md5_info() -> HashTypeInfo {
    HashTypeInfo::new("md5", 0.9).with_john("raw-md5").with_hashcat(0)
}

pub fn request(hash: &str, wordlists: &[&str]) -> CrackRequest {
    CrackRequest::new(
        TEAM,
        "alice",
        hash,
        md5_info(),
        wordlists.iter().map(|w| w.to_string()).collect(),
    )
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

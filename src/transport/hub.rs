use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{Message, Transport, TransportError};

pub type PeerSender = mpsc::UnboundedSender<Message>;

struct PeerConnection {
    conn_id: Uuid,
    team_id: String,
    sender: PeerSender,
}

/// Live peer connections keyed by peer id.
///
/// A peer holds at most one connection; reconnecting replaces the old sender,
/// whose receiver then drains and ends.
#[derive(Default)]
pub struct PeerHub {
    connections: RwLock<HashMap<String, PeerConnection>>,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id plus the outbound receiver.
    pub async fn connect(&self, team_id: &str, peer_id: &str) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        let conn = PeerConnection {
            conn_id,
            team_id: team_id.to_string(),
            sender: tx,
        };
        let replaced = self
            .connections
            .write()
            .await
            .insert(peer_id.to_string(), conn);
        if replaced.is_some() {
            tracing::info!(peer_id, "Replaced existing peer connection");
        }
        (conn_id, rx)
    }

    /// Remove the peer's connection if it is still `conn_id`.
    ///
    /// Returns false when a newer connection has taken over.
    pub async fn disconnect(&self, peer_id: &str, conn_id: Uuid) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(peer_id) {
            Some(conn) if conn.conn_id == conn_id => {
                conns.remove(peer_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_connected(&self, peer_id: &str) -> bool {
        self.connections.read().await.contains_key(peer_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Drop every sender so each socket task sees its channel end and closes.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        conns.clear();
        tracing::info!(count, "Closed all peer connections");
    }
}

#[async_trait]
impl Transport for PeerHub {
    async fn send_to_peer(&self, peer_id: &str, message: &Message) -> Result<(), TransportError> {
        let conns = self.connections.read().await;
        let conn = conns
            .get(peer_id)
            .ok_or_else(|| TransportError::PeerNotConnected(peer_id.to_string()))?;
        conn.sender
            .send(message.clone())
            .map_err(|_| TransportError::ChannelClosed(peer_id.to_string()))
    }

    async fn broadcast_to_team(&self, team_id: &str, message: &Message) -> Result<usize, TransportError> {
        let conns = self.connections.read().await;
        let mut count = 0;
        for (peer_id, conn) in conns.iter().filter(|(_, c)| c.team_id == team_id) {
            if conn.sender.send(message.clone()).is_ok() {
                count += 1;
            } else {
                tracing::debug!(peer_id = %peer_id, "Skipping closed peer channel");
            }
        }
        Ok(count)
    }
}

//! Delivery of coordinator messages to connected peers.

pub mod hub;
pub mod message;

use async_trait::async_trait;
use thiserror::Error;

pub use hub::PeerHub;
pub use message::{Message, PeerMessage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("Channel to peer {0} is closed")]
    ChannelClosed(String),
}

/// Outbound message delivery.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to_peer(&self, peer_id: &str, message: &Message) -> Result<(), TransportError>;

    /// Send to every connected member of `team_id`, returning how many received it.
    async fn broadcast_to_team(&self, team_id: &str, message: &Message) -> Result<usize, TransportError>;
}

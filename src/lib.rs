pub mod api;
pub mod cache;
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod node;
pub mod progress;
pub mod shutdown;
pub mod transport;

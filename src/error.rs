use thiserror::Error;
use uuid::Uuid;

use crate::coordinator::JobStatus;
use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Peer {peer_id} holds no assignment on job {job_id}")]
    PeerNotFound { job_id: Uuid, peer_id: String },

    #[error("Team not found: {0}")]
    TeamNotFound(String),

    #[error("Wordlist not found: {0}")]
    WordlistNotFound(String),

    #[error("Peer {user_id} is not a member of team {team_id}")]
    Unauthorized { team_id: String, user_id: String },

    #[error("No engine format mapping for hash type {0}")]
    EngineUnavailable(String),

    #[error("Job {0} is already completed")]
    ConflictAlreadyCompleted(Uuid),

    #[error("Cache already holds a different plaintext for {0}")]
    CacheConflict(String),

    #[error("Peer {peer_id} missed its heartbeat on job {job_id}")]
    Timeout { job_id: Uuid, peer_id: String },

    #[error("Illegal job transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level classification of a [`CoordinatorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    EngineUnavailable,
    ConflictAlreadyCompleted,
    CacheConflict,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::EngineUnavailable => "ENGINE_UNAVAILABLE",
            ErrorKind::ConflictAlreadyCompleted => "CONFLICT_ALREADY_COMPLETED",
            ErrorKind::CacheConflict => "CACHE_CONFLICT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::InvalidInput(_) | CoordinatorError::InvalidTransition { .. } => {
                ErrorKind::InvalidInput
            }
            CoordinatorError::JobNotFound(_)
            | CoordinatorError::PeerNotFound { .. }
            | CoordinatorError::TeamNotFound(_)
            | CoordinatorError::WordlistNotFound(_) => ErrorKind::NotFound,
            CoordinatorError::Unauthorized { .. } => ErrorKind::Unauthorized,
            CoordinatorError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            CoordinatorError::ConflictAlreadyCompleted(_) => ErrorKind::ConflictAlreadyCompleted,
            CoordinatorError::CacheConflict(_) => ErrorKind::CacheConflict,
            CoordinatorError::Timeout { .. } => ErrorKind::Timeout,
            CoordinatorError::Transport(_)
            | CoordinatorError::Persistence(_)
            | CoordinatorError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

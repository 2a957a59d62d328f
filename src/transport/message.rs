use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{HashTypeInfo, Strategy, WordlistChunk};
use crate::engine::EngineKind;
use crate::progress::ProgressSnapshot;

/// Coordinator to peer messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    JobCreated {
        job_id: Uuid,
        hash_type: String,
        created_by: String,
        wordlist_count: usize,
    },
    JobAssignment {
        job_id: Uuid,
        peer_id: String,
        hash: String,
        strategy: Strategy,
        wordlist_chunk: WordlistChunk,
        hash_type_info: HashTypeInfo,
    },
    ProgressUpdate(ProgressSnapshot),
    JobCompleted {
        job_id: Uuid,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plaintext: Option<String>,
        time_taken: f64,
        #[serde(default)]
        engine_used: Option<String>,
    },
    JobCancelled {
        job_id: Uuid,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ResultAck {
        job_id: Uuid,
        accepted: bool,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::JobCreated { .. } => "job_created",
            Message::JobAssignment { .. } => "job_assignment",
            Message::ProgressUpdate(_) => "progress_update",
            Message::JobCompleted { .. } => "job_completed",
            Message::JobCancelled { .. } => "job_cancelled",
            Message::ResultAck { .. } => "result_ack",
            Message::Error { .. } => "error",
        }
    }
}

/// Peer to coordinator messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    Heartbeat,
    ReportProgress {
        job_id: Uuid,
        attempted: u64,
        total: u64,
        rate: f64,
    },
    EngineStatus {
        job_id: Uuid,
        engine: EngineKind,
        output: String,
    },
    ReportResult {
        job_id: Uuid,
        success: bool,
        #[serde(default)]
        plaintext: Option<String>,
        #[serde(default)]
        engine: Option<String>,
    },
}

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EngineKind, EngineProgress};

/// Slice of one wordlist handed to a peer.
///
/// `slice_index` of `slice_count` equal line ranges; a whole wordlist is slice
/// `0` of `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordlistChunk {
    pub wordlist: String,
    pub slice_index: u32,
    pub slice_count: u32,
}

impl WordlistChunk {
    pub fn whole(wordlist: impl Into<String>) -> Self {
        Self {
            wordlist: wordlist.into(),
            slice_index: 0,
            slice_count: 1,
        }
    }

    pub fn slice(wordlist: impl Into<String>, slice_index: u32, slice_count: u32) -> Self {
        Self {
            wordlist: wordlist.into(),
            slice_index,
            slice_count,
        }
    }

    pub fn is_whole(&self) -> bool {
        self.slice_count <= 1
    }
}

impl fmt::Display for WordlistChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole() {
            write!(f, "{}", self.wordlist)
        } else {
            write!(
                f,
                "{}[{}/{}]",
                self.wordlist,
                self.slice_index + 1,
                self.slice_count
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Stale,
}

impl AssignmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Assigned | AssignmentStatus::Running)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStatus::Assigned => write!(f, "assigned"),
            AssignmentStatus::Running => write!(f, "running"),
            AssignmentStatus::Succeeded => write!(f, "succeeded"),
            AssignmentStatus::Failed => write!(f, "failed"),
            AssignmentStatus::Cancelled => write!(f, "cancelled"),
            AssignmentStatus::Stale => write!(f, "stale"),
        }
    }
}

/// One peer's share of a job.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub job_id: Uuid,
    pub peer_id: String,
    pub chunk: WordlistChunk,
    pub status: AssignmentStatus,
    pub progress_percent: f64,
    pub attempted_count: u64,
    pub total_count: u64,
    pub rate_per_second: f64,
    pub cracked_count: u64,
    pub eta_seconds: Option<u64>,
    pub engine: Option<String>,
    pub current_candidate: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub last_heartbeat: Instant,
}

impl Assignment {
    pub fn new(job_id: Uuid, peer_id: String, chunk: WordlistChunk, now: Instant) -> Self {
        Self {
            job_id,
            peer_id,
            chunk,
            status: AssignmentStatus::Assigned,
            progress_percent: 0.0,
            attempted_count: 0,
            total_count: 0,
            rate_per_second: 0.0,
            cracked_count: 0,
            eta_seconds: None,
            engine: None,
            current_candidate: None,
            assigned_at: Utc::now(),
            last_heartbeat: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// No report within `stale_after` of the last heartbeat.
    pub fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        self.is_active() && now.saturating_duration_since(self.last_heartbeat) >= stale_after
    }

    pub fn record_counts(&mut self, attempted: u64, total: u64, rate: f64, now: Instant) {
        self.attempted_count = attempted;
        self.total_count = total;
        self.rate_per_second = sanitize_rate(rate);
        if total > 0 {
            self.progress_percent = clamp_percent(attempted as f64 / total as f64 * 100.0);
        }
        self.mark_running(now);
    }

    pub fn record_engine(&mut self, progress: &EngineProgress, engine: EngineKind, now: Instant) {
        if let Some(percent) = progress.progress_percent {
            self.progress_percent = clamp_percent(percent);
        }
        if let Some(rate) = progress.rate_per_second {
            self.rate_per_second = sanitize_rate(rate);
        }
        if let Some(cracked) = progress.cracked_count {
            self.cracked_count = cracked;
        }
        if let Some(ref candidate) = progress.current_candidate {
            self.current_candidate = Some(candidate.clone());
        }
        if progress.eta_seconds.is_some() {
            self.eta_seconds = progress.eta_seconds;
        }
        self.engine = Some(engine.as_str().to_string());
        self.mark_running(now);
    }

    fn mark_running(&mut self, now: Instant) {
        if self.status == AssignmentStatus::Assigned {
            self.status = AssignmentStatus::Running;
        }
        self.last_heartbeat = now;
    }

    pub fn view(&self) -> AssignmentView {
        AssignmentView {
            peer_id: self.peer_id.clone(),
            chunk: self.chunk.clone(),
            status: self.status,
            progress_percent: self.progress_percent,
            attempted_count: self.attempted_count,
            total_count: self.total_count,
            rate_per_second: self.rate_per_second,
            engine: self.engine.clone(),
            current_candidate: self.current_candidate.clone(),
            assigned_at: self.assigned_at,
        }
    }
}

/// Serializable view of an [`Assignment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub peer_id: String,
    pub chunk: WordlistChunk,
    pub status: AssignmentStatus,
    pub progress_percent: f64,
    pub attempted_count: u64,
    pub total_count: u64,
    pub rate_per_second: f64,
    pub engine: Option<String>,
    pub current_candidate: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment::new(
            Uuid::new_v4(),
            "peer-1".to_string(),
            WordlistChunk::whole("rockyou.txt"),
            Instant::now(),
        )
    }

    #[test]
    fn counts_drive_percent_and_status() {
        let mut a = assignment();
        a.record_counts(25_000, 100_000, 1_000.0, Instant::now());
        assert_eq!(a.status, AssignmentStatus::Running);
        assert_eq!(a.progress_percent, 25.0);
        assert_eq!(a.rate_per_second, 1_000.0);
    }

    #[test]
    fn overshooting_counts_are_clamped() {
        let mut a = assignment();
        a.record_counts(150, 100, -5.0, Instant::now());
        assert_eq!(a.progress_percent, 100.0);
        assert_eq!(a.rate_per_second, 0.0);
    }

    #[test]
    fn unknown_total_keeps_percent() {
        let mut a = assignment();
        a.progress_percent = 12.0;
        a.record_counts(500, 0, 10.0, Instant::now());
        assert_eq!(a.progress_percent, 12.0);
    }

    #[test]
    fn staleness_uses_last_heartbeat() {
        let start = Instant::now();
        let a = Assignment::new(
            Uuid::new_v4(),
            "peer-1".to_string(),
            WordlistChunk::whole("a.txt"),
            start,
        );
        let window = Duration::from_secs(30);
        assert!(!a.is_stale(start + Duration::from_secs(29), window));
        assert!(a.is_stale(start + Duration::from_secs(30), window));
    }

    #[test]
    fn terminal_assignment_is_never_stale() {
        let start = Instant::now();
        let mut a = assignment();
        a.status = AssignmentStatus::Failed;
        assert!(!a.is_stale(start + Duration::from_secs(3600), Duration::from_secs(1)));
    }

    #[test]
    fn chunk_display() {
        assert_eq!(WordlistChunk::whole("a.txt").to_string(), "a.txt");
        assert_eq!(WordlistChunk::slice("a.txt", 1, 4).to_string(), "a.txt[2/4]");
    }
}

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::assignment::{
    clamp_percent, Assignment, AssignmentStatus, AssignmentView, WordlistChunk,
};
use crate::engine::{EngineKind, EngineProgress};
use crate::error::{CoordinatorError, Result};
use crate::progress::ProgressFields;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Dictionary,
    Rules,
    Hybrid,
    BruteForce,
    Smart,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Dictionary => "dictionary",
            Strategy::Rules => "rules",
            Strategy::Hybrid => "hybrid",
            Strategy::BruteForce => "brute_force",
            Strategy::Smart => "smart",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "dictionary" => Ok(Strategy::Dictionary),
            "rules" => Ok(Strategy::Rules),
            "hybrid" => Ok(Strategy::Hybrid),
            "brute_force" => Ok(Strategy::BruteForce),
            "smart" => Ok(Strategy::Smart),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

/// A candidate hash type with its engine mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashTypeInfo {
    pub hash_type: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub john_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashcat_mode: Option<u32>,
}

impl HashTypeInfo {
    pub fn new(hash_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            hash_type: hash_type.into(),
            confidence,
            john_format: None,
            hashcat_mode: None,
        }
    }

    pub fn with_john(mut self, format: impl Into<String>) -> Self {
        self.john_format = Some(format.into());
        self
    }

    pub fn with_hashcat(mut self, mode: u32) -> Self {
        self.hashcat_mode = Some(mode);
        self
    }

    /// At least one engine knows how to attack this type.
    pub fn has_engine_mapping(&self) -> bool {
        self.john_format.is_some() || self.hashcat_mode.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrackResult {
    pub plaintext: String,
    pub solved_by: String,
    pub engine: Option<String>,
    pub time_taken_secs: f64,
    pub solved_at: DateTime<Utc>,
}

/// A request to recover the plaintext of one hash.
#[derive(Debug, Clone)]
pub struct CrackRequest {
    pub team_id: String,
    pub requested_by: String,
    pub fingerprint: String,
    pub hash_type_info: HashTypeInfo,
    pub wordlist_refs: Vec<String>,
    pub strategy: Strategy,
}

impl CrackRequest {
    pub fn new(
        team_id: impl Into<String>,
        requested_by: impl Into<String>,
        fingerprint: impl Into<String>,
        hash_type_info: HashTypeInfo,
        wordlist_refs: Vec<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            requested_by: requested_by.into(),
            fingerprint: fingerprint.into(),
            hash_type_info,
            wordlist_refs,
            strategy: Strategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Outcome of applying a progress or engine report to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDisposition {
    Applied,
    JobTerminal,
    UnknownAssignment,
    AssignmentTerminal,
}

/// Outcome of applying a result report.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// The reporting assignment was no longer eligible.
    Discarded,
    /// The job completed; the listed peers had their work cancelled.
    Completed { cancelled: Vec<String> },
    /// Every assignment finished without a match.
    Failed,
    /// The failure was recorded and the peer received the next pending chunk.
    Reassigned(Assignment),
    /// The failure was recorded; other assignments are still running.
    Recorded,
}

/// Chunks reclaimed from silent or departed peers.
#[derive(Debug, Default)]
pub struct Reclaim {
    pub stale: Vec<String>,
    pub handed: Vec<Assignment>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub team_id: String,
    pub requested_by: String,
    pub fingerprint: String,
    pub hash_type_info: HashTypeInfo,
    pub wordlist_refs: Vec<String>,
    pub strategy: Strategy,
    pub status: JobStatus,
    pub assignments: HashMap<String, Assignment>,
    pub retired: Vec<Assignment>,
    pub pending: VecDeque<WordlistChunk>,
    pub total_chunks: usize,
    pub progress_percent: f64,
    pub result: Option<CrackResult>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    terminated_instant: Option<Instant>,
    revision: u64,
}

impl Job {
    pub fn new(id: JobId, request: &CrackRequest, chunks: Vec<WordlistChunk>) -> Self {
        Self {
            id,
            team_id: request.team_id.clone(),
            requested_by: request.requested_by.clone(),
            fingerprint: request.fingerprint.clone(),
            hash_type_info: request.hash_type_info.clone(),
            wordlist_refs: request.wordlist_refs.clone(),
            strategy: request.strategy,
            status: JobStatus::Queued,
            assignments: HashMap::new(),
            retired: Vec::new(),
            total_chunks: chunks.len(),
            pending: chunks.into(),
            progress_percent: 0.0,
            result: None,
            message: None,
            created_at: Utc::now(),
            terminated_at: None,
            terminated_instant: None,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, rejecting moves outside the transition table.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.terminated_at = Some(Utc::now());
            self.terminated_instant = Some(Instant::now());
        }
        self.bump();
        Ok(())
    }

    /// Terminal for at least `retention`.
    pub fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        match self.terminated_instant {
            Some(at) => now.saturating_duration_since(at) >= retention,
            None => false,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    pub fn has_active_assignment(&self, peer_id: &str) -> bool {
        self.assignments
            .get(peer_id)
            .is_some_and(Assignment::is_active)
    }

    /// The peer was handed a chunk of this job at some point.
    pub fn has_held_assignment(&self, peer_id: &str) -> bool {
        self.assignments.contains_key(peer_id) || self.retired.iter().any(|a| a.peer_id == peer_id)
    }

    /// The assignment a result report from `peer_id` refers to: the current
    /// one, else the most recently retired one.
    fn assignment_for_report_mut(&mut self, peer_id: &str) -> Option<&mut Assignment> {
        if self.assignments.contains_key(peer_id) {
            return self.assignments.get_mut(peer_id);
        }
        self.retired.iter_mut().rev().find(|a| a.peer_id == peer_id)
    }

    fn install(&mut self, peer_id: &str, chunk: WordlistChunk, now: Instant) -> Assignment {
        let assignment = Assignment::new(self.id, peer_id.to_string(), chunk, now);
        if let Some(previous) = self.assignments.insert(peer_id.to_string(), assignment.clone()) {
            self.retired.push(previous);
        }
        self.bump();
        assignment
    }

    /// Hand pending chunks to peers in `available` that hold no active
    /// assignment, one chunk per peer in order.
    pub fn fill_from_pending(
        &mut self,
        available: &[String],
        exclude: &[String],
        now: Instant,
    ) -> Result<Vec<Assignment>> {
        let mut handed = Vec::new();
        if self.is_terminal() {
            return Ok(handed);
        }

        for peer in available {
            if self.pending.is_empty() {
                break;
            }
            if exclude.contains(peer) || self.has_active_assignment(peer) {
                continue;
            }
            if let Some(chunk) = self.pending.pop_front() {
                handed.push(self.install(peer, chunk, now));
            }
        }

        if !handed.is_empty() {
            if self.status == JobStatus::Queued {
                self.transition(JobStatus::Running)?;
            }
            self.recompute_progress();
        }
        Ok(handed)
    }

    pub fn record_progress(
        &mut self,
        peer_id: &str,
        attempted: u64,
        total: u64,
        rate: f64,
        now: Instant,
    ) -> ReportDisposition {
        let disposition = self.with_active(peer_id, |a| a.record_counts(attempted, total, rate, now));
        if disposition == ReportDisposition::Applied {
            self.bump();
            self.recompute_progress();
        }
        disposition
    }

    pub fn record_engine(
        &mut self,
        peer_id: &str,
        engine: EngineKind,
        progress: &EngineProgress,
        now: Instant,
    ) -> ReportDisposition {
        let disposition = self.with_active(peer_id, |a| a.record_engine(progress, engine, now));
        if disposition == ReportDisposition::Applied {
            self.bump();
            self.recompute_progress();
        }
        disposition
    }

    fn with_active(
        &mut self,
        peer_id: &str,
        apply: impl FnOnce(&mut Assignment),
    ) -> ReportDisposition {
        if self.is_terminal() {
            return ReportDisposition::JobTerminal;
        }
        match self.assignments.get_mut(peer_id) {
            None => ReportDisposition::UnknownAssignment,
            Some(a) if a.status.is_terminal() => ReportDisposition::AssignmentTerminal,
            Some(a) => {
                apply(a);
                ReportDisposition::Applied
            }
        }
    }

    /// Accept a recovered plaintext from `peer_id`.
    ///
    /// The `Running -> Completed` transition is the arbitration point: callers
    /// hold the job lock, so only the first success gets past it.
    pub fn settle_success(
        &mut self,
        peer_id: &str,
        plaintext: String,
        engine: Option<String>,
    ) -> Result<Settlement> {
        let job_id = self.id;
        let eligible = match self.assignment_for_report_mut(peer_id) {
            None => {
                return Err(CoordinatorError::PeerNotFound {
                    job_id,
                    peer_id: peer_id.to_string(),
                })
            }
            Some(a) => matches!(
                a.status,
                AssignmentStatus::Assigned | AssignmentStatus::Running | AssignmentStatus::Stale
            ),
        };
        if !eligible {
            return Ok(Settlement::Discarded);
        }

        self.transition(JobStatus::Completed)?;

        if let Some(winner) = self.assignment_for_report_mut(peer_id) {
            winner.status = AssignmentStatus::Succeeded;
            winner.progress_percent = 100.0;
            if engine.is_some() {
                winner.engine = engine.clone();
            }
        }
        let cancelled = self.cancel_active_except(Some(peer_id));
        self.pending.clear();
        self.progress_percent = 100.0;

        let elapsed = Utc::now() - self.created_at;
        self.result = Some(CrackResult {
            plaintext,
            solved_by: peer_id.to_string(),
            engine,
            time_taken_secs: elapsed.num_milliseconds().max(0) as f64 / 1000.0,
            solved_at: Utc::now(),
        });
        self.message = Some(format!("Recovered by {}", peer_id));
        Ok(Settlement::Completed { cancelled })
    }

    /// Record that `peer_id` exhausted its chunk without a match.
    pub fn settle_failure(&mut self, peer_id: &str, now: Instant) -> Result<Settlement> {
        let current_active = match self.assignments.get_mut(peer_id) {
            Some(a) if a.is_active() => {
                a.status = AssignmentStatus::Failed;
                true
            }
            _ => false,
        };
        if !current_active {
            if self.has_held_assignment(peer_id) {
                return Ok(Settlement::Discarded);
            }
            return Err(CoordinatorError::PeerNotFound {
                job_id: self.id,
                peer_id: peer_id.to_string(),
            });
        }
        self.bump();

        if let Some(next) = self.pending.pop_front() {
            let assignment = self.install(peer_id, next, now);
            self.recompute_progress();
            return Ok(Settlement::Reassigned(assignment));
        }

        if self.assignments.values().all(|a| a.status.is_terminal()) {
            self.transition(JobStatus::Failed)?;
            self.message = Some("Every chunk was exhausted without a match".to_string());
            self.recompute_progress();
            return Ok(Settlement::Failed);
        }

        self.recompute_progress();
        Ok(Settlement::Recorded)
    }

    /// Cancel the job, returning the peers whose work was stopped.
    pub fn cancel(&mut self, reason: &str) -> Result<Vec<String>> {
        self.transition(JobStatus::Cancelled)?;
        let cancelled = self.cancel_active_except(None);
        self.pending.clear();
        self.message = Some(reason.to_string());
        Ok(cancelled)
    }

    fn cancel_active_except(&mut self, keep: Option<&str>) -> Vec<String> {
        let mut cancelled: Vec<String> = self
            .assignments
            .values_mut()
            .filter(|a| a.is_active() && Some(a.peer_id.as_str()) != keep)
            .map(|a| {
                a.status = AssignmentStatus::Cancelled;
                a.peer_id.clone()
            })
            .collect();
        cancelled.sort();
        cancelled
    }

    /// Reclaim chunks from assignments silent for `stale_after`.
    pub fn reclaim_stale(
        &mut self,
        now: Instant,
        stale_after: Duration,
        available: &[String],
    ) -> Result<Reclaim> {
        let mut silent: Vec<String> = self
            .assignments
            .values()
            .filter(|a| a.is_stale(now, stale_after))
            .map(|a| a.peer_id.clone())
            .collect();
        silent.sort();
        self.reclaim(&silent, available, now)
    }

    /// Mark the active assignments of `peers` stale, queue their chunks at the
    /// front of the pending list and hand them to idle peers.
    pub fn reclaim(&mut self, peers: &[String], available: &[String], now: Instant) -> Result<Reclaim> {
        let mut reclaim = Reclaim::default();
        if self.is_terminal() {
            return Ok(reclaim);
        }

        for peer in peers.iter().rev() {
            if !self.has_active_assignment(peer) {
                continue;
            }
            if let Some(mut assignment) = self.assignments.remove(peer) {
                assignment.status = AssignmentStatus::Stale;
                self.pending.push_front(assignment.chunk.clone());
                self.retired.push(assignment);
                reclaim.stale.push(peer.clone());
            }
        }
        if reclaim.stale.is_empty() {
            return Ok(reclaim);
        }
        reclaim.stale.reverse();
        self.bump();

        reclaim.handed = self.fill_from_pending(available, &reclaim.stale, now)?;
        self.recompute_progress();
        Ok(reclaim)
    }

    /// Chunk-normalized completion: finished chunks count fully, active ones by
    /// their own percent, pending and reclaimed ones not at all.
    pub fn recompute_progress(&mut self) {
        if self.status == JobStatus::Completed {
            self.progress_percent = 100.0;
            return;
        }
        if self.total_chunks == 0 {
            self.progress_percent = 0.0;
            return;
        }

        let retired: f64 = self
            .retired
            .iter()
            .filter(|a| a.status == AssignmentStatus::Failed)
            .count() as f64
            * 100.0;
        let current: f64 = self
            .assignments
            .values()
            .map(|a| match a.status {
                AssignmentStatus::Succeeded | AssignmentStatus::Failed => 100.0,
                AssignmentStatus::Stale => 0.0,
                _ => a.progress_percent,
            })
            .sum();

        self.progress_percent = clamp_percent((retired + current) / self.total_chunks as f64);
    }

    /// Aggregate fields for the progress aggregator.
    pub fn progress_fields(&self) -> ProgressFields {
        let counted = self
            .assignments
            .values()
            .filter(|a| a.status != AssignmentStatus::Stale)
            .chain(self.retired.iter().filter(|a| a.status == AssignmentStatus::Failed));

        let (attempted, total) = counted.fold((0u64, 0u64), |(att, tot), a| {
            (
                att.saturating_add(a.attempted_count),
                tot.saturating_add(a.total_count),
            )
        });
        let active = || self.assignments.values().filter(|a| a.is_active());
        let rate: f64 = active().map(|a| a.rate_per_second).sum();
        let eta_hint = active().filter_map(|a| a.eta_seconds).max();
        let engine = active()
            .filter(|a| a.engine.is_some())
            .max_by_key(|a| a.last_heartbeat)
            .and_then(|a| a.engine.clone());

        ProgressFields {
            revision: Some(self.revision),
            status: Some(self.status),
            progress_percent: Some(self.progress_percent),
            attempted_count: Some(attempted),
            total_count: Some(total),
            rate_per_second: Some(rate),
            eta_hint,
            engine,
            message: self.message.clone(),
        }
    }

    pub fn view(&self) -> JobView {
        let mut assignments: Vec<AssignmentView> =
            self.assignments.values().map(Assignment::view).collect();
        assignments.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        JobView {
            id: self.id,
            team_id: self.team_id.clone(),
            requested_by: self.requested_by.clone(),
            fingerprint: self.fingerprint.clone(),
            hash_type_info: self.hash_type_info.clone(),
            wordlists: self.wordlist_refs.clone(),
            strategy: self.strategy,
            status: self.status,
            progress_percent: self.progress_percent,
            assignments,
            retired_assignments: self.retired.iter().map(Assignment::view).collect(),
            pending_chunks: self.pending.len(),
            total_chunks: self.total_chunks,
            result: self.result.clone(),
            message: self.message.clone(),
            created_at: self.created_at,
            terminated_at: self.terminated_at,
        }
    }
}

/// Serializable view of a [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub team_id: String,
    pub requested_by: String,
    pub fingerprint: String,
    pub hash_type_info: HashTypeInfo,
    pub wordlists: Vec<String>,
    pub strategy: Strategy,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub assignments: Vec<AssignmentView>,
    pub retired_assignments: Vec<AssignmentView>,
    pub pending_chunks: usize,
    pub total_chunks: usize,
    pub result: Option<CrackResult>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

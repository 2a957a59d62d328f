//! Per-job progress aggregation and rate-limited snapshot emission.
//!
//! Each job has one slot holding the latest merged snapshot. Updates merge the
//! fields they carry, derive percent and ETA, and produce a snapshot to
//! broadcast only when the slot has not emitted within the configured interval.
//! Final snapshots bypass the limit.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress_percent: f64,
    pub attempted_count: u64,
    pub total_count: u64,
    pub rate_per_second: f64,
    pub eta_seconds: Option<u64>,
    pub engine: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            progress_percent: 0.0,
            attempted_count: 0,
            total_count: 0,
            rate_per_second: 0.0,
            eta_seconds: None,
            engine: None,
            message: None,
            timestamp: Utc::now(),
        }
    }
}

/// Partial update; absent fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFields {
    /// Monotonic source revision. Updates older than the last applied one are dropped.
    pub revision: Option<u64>,
    pub status: Option<JobStatus>,
    pub progress_percent: Option<f64>,
    pub attempted_count: Option<u64>,
    pub total_count: Option<u64>,
    pub rate_per_second: Option<f64>,
    /// Used when no ETA can be derived from counts and rate.
    pub eta_hint: Option<u64>,
    pub engine: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug)]
struct Slot {
    snapshot: ProgressSnapshot,
    eta_hint: Option<u64>,
    revision: Option<u64>,
    last_emitted: Option<Instant>,
    finalized: bool,
}

impl Slot {
    fn new(job_id: Uuid) -> Self {
        Self {
            snapshot: ProgressSnapshot::new(job_id),
            eta_hint: None,
            revision: None,
            last_emitted: None,
            finalized: false,
        }
    }

    /// Returns false when the update is older than what the slot holds.
    fn merge(&mut self, fields: ProgressFields) -> bool {
        if let (Some(seen), Some(incoming)) = (self.revision, fields.revision) {
            if incoming <= seen {
                return false;
            }
        }
        if fields.revision.is_some() {
            self.revision = fields.revision;
        }

        let snap = &mut self.snapshot;
        if let Some(status) = fields.status {
            snap.status = status;
        }
        if let Some(attempted) = fields.attempted_count {
            snap.attempted_count = attempted;
        }
        if let Some(total) = fields.total_count {
            snap.total_count = total;
        }
        if let Some(rate) = fields.rate_per_second {
            snap.rate_per_second = if rate.is_finite() { rate.max(0.0) } else { 0.0 };
        }
        if fields.engine.is_some() {
            snap.engine = fields.engine;
        }
        if fields.message.is_some() {
            snap.message = fields.message;
        }
        if fields.eta_hint.is_some() {
            self.eta_hint = fields.eta_hint;
        }

        if let Some(percent) = fields.progress_percent {
            snap.progress_percent = clamp(percent);
        } else if (fields.attempted_count.is_some() || fields.total_count.is_some())
            && snap.total_count > 0
        {
            snap.progress_percent =
                clamp(snap.attempted_count as f64 / snap.total_count as f64 * 100.0);
        }

        snap.eta_seconds = derive_eta(snap, self.eta_hint);
        snap.timestamp = Utc::now();
        true
    }
}

fn clamp(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

fn derive_eta(snap: &ProgressSnapshot, hint: Option<u64>) -> Option<u64> {
    if snap.rate_per_second > 0.0 && snap.total_count > 0 && snap.total_count >= snap.attempted_count
    {
        let remaining = (snap.total_count - snap.attempted_count) as f64;
        Some((remaining / snap.rate_per_second).floor() as u64)
    } else {
        hint
    }
}

#[derive(Debug)]
pub struct ProgressAggregator {
    slots: DashMap<Uuid, Slot>,
    min_interval: Duration,
}

impl ProgressAggregator {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            min_interval,
        }
    }

    /// Merge `fields` into the job's slot. Returns a snapshot when one is due.
    pub fn update(&self, job_id: Uuid, fields: ProgressFields, now: Instant) -> Option<ProgressSnapshot> {
        let mut slot = self.slots.entry(job_id).or_insert_with(|| Slot::new(job_id));
        if slot.finalized || !slot.merge(fields) {
            return None;
        }

        let due = match slot.last_emitted {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.min_interval,
        };
        if !due {
            return None;
        }
        slot.last_emitted = Some(now);
        Some(slot.snapshot.clone())
    }

    /// Merge the final fields and always return the snapshot. Later updates are ignored.
    pub fn finalize(&self, job_id: Uuid, fields: ProgressFields, now: Instant) -> ProgressSnapshot {
        let mut slot = self.slots.entry(job_id).or_insert_with(|| Slot::new(job_id));
        // A terminal state must reach the slot even if a newer revision raced ahead.
        slot.revision = None;
        slot.merge(fields);
        slot.finalized = true;
        slot.last_emitted = Some(now);
        slot.snapshot.clone()
    }

    pub fn snapshot(&self, job_id: Uuid) -> Option<ProgressSnapshot> {
        self.slots.get(&job_id).map(|s| s.snapshot.clone())
    }

    pub fn remove(&self, job_id: Uuid) -> Option<ProgressSnapshot> {
        self.slots.remove(&job_id).map(|(_, slot)| slot.snapshot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

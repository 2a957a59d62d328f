use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::collab::{PeerAuthorizer, WordlistResolver};
use crate::config::CoordinatorConfig;
use crate::coordinator::assignment::Assignment;
use crate::coordinator::job::{
    CrackRequest, CrackResult, Job, JobId, JobStatus, JobView, ReportDisposition, Settlement,
};
use crate::coordinator::partition::partition;
use crate::coordinator::peers::PeerRegistry;
use crate::engine::{EngineKind, EngineProgress};
use crate::error::{CoordinatorError, Result};
use crate::progress::{ProgressAggregator, ProgressFields};
use crate::transport::{Message, Transport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub attempted: u64,
    pub total: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultReport {
    pub success: bool,
    pub plaintext: Option<String>,
    pub engine: Option<String>,
}

impl ResultReport {
    pub fn success(plaintext: impl Into<String>) -> Self {
        Self {
            success: true,
            plaintext: Some(plaintext.into()),
            engine: None,
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultAck {
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CreateOutcome {
    Created { job_id: JobId },
    Joined { job_id: JobId },
    Cached { job_id: JobId, plaintext: String },
}

impl CreateOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            CreateOutcome::Created { job_id }
            | CreateOutcome::Joined { job_id }
            | CreateOutcome::Cached { job_id, .. } => *job_id,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub stale: usize,
    pub reassigned: usize,
    pub collected: usize,
}

enum Outbound {
    Peer(String, Message),
    Team(String, Message),
}

/// Stable id for a fingerprint answered from the cache.
pub fn cached_job_id(fingerprint: &str) -> JobId {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes())
}

/// Owns every job and arbitrates between peers working on them.
///
/// Each job sits behind its own mutex; no operation holds more than one job
/// lock, and nothing is sent, cached or aggregated while a lock is held.
pub struct Coordinator {
    config: CoordinatorConfig,
    jobs: DashMap<JobId, Arc<Mutex<Job>>>,
    /// Fingerprint to its one non-terminal job
    active: DashMap<String, JobId>,
    peers: PeerRegistry,
    cache: Arc<ResultCache>,
    progress: ProgressAggregator,
    transport: Arc<dyn Transport>,
    authorizer: Arc<dyn PeerAuthorizer>,
    resolver: Option<Arc<dyn WordlistResolver>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
        authorizer: Arc<dyn PeerAuthorizer>,
    ) -> Self {
        Self {
            peers: PeerRegistry::new(config.peer_timeout()),
            progress: ProgressAggregator::new(config.progress_interval()),
            config,
            jobs: DashMap::new(),
            active: DashMap::new(),
            cache: Arc::new(ResultCache::new()),
            transport,
            authorizer,
            resolver: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn WordlistResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn active_job(&self, fingerprint: &str) -> Option<JobId> {
        self.active.get(fingerprint.trim()).map(|e| *e.value())
    }

    pub fn authorize(&self, team_id: &str, user_id: &str) -> Result<()> {
        if self.authorizer.is_authorized_peer(team_id, user_id) {
            Ok(())
        } else {
            Err(CoordinatorError::Unauthorized {
                team_id: team_id.to_string(),
                user_id: user_id.to_string(),
            })
        }
    }

    fn job(&self, job_id: JobId) -> Result<Arc<Mutex<Job>>> {
        self.jobs
            .get(&job_id)
            .map(|e| e.value().clone())
            .ok_or(CoordinatorError::JobNotFound(job_id))
    }

    fn job_handles(&self) -> Vec<Arc<Mutex<Job>>> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }

    fn release(&self, fingerprint: &str, job_id: JobId) {
        self.active.remove_if(fingerprint, |_, id| *id == job_id);
    }

    pub async fn create_job(&self, request: CrackRequest) -> Result<CreateOutcome> {
        let mut request = request;
        request.fingerprint = request.fingerprint.trim().to_string();

        if request.fingerprint.is_empty() {
            return Err(CoordinatorError::InvalidInput(
                "hash fingerprint is empty".to_string(),
            ));
        }
        if request.wordlist_refs.is_empty() {
            return Err(CoordinatorError::InvalidInput(
                "at least one wordlist is required".to_string(),
            ));
        }
        if request.wordlist_refs.iter().any(|w| w.trim().is_empty()) {
            return Err(CoordinatorError::InvalidInput(
                "wordlist reference is empty".to_string(),
            ));
        }
        self.authorize(&request.team_id, &request.requested_by)?;
        if !request.hash_type_info.has_engine_mapping() {
            return Err(CoordinatorError::EngineUnavailable(
                request.hash_type_info.hash_type.clone(),
            ));
        }
        if let Some(resolver) = &self.resolver {
            for wordlist in &request.wordlist_refs {
                resolver.resolve(wordlist)?;
            }
        }

        let fingerprint = request.fingerprint.clone();
        if let Some(plaintext) = self.cache.plaintext(&fingerprint) {
            tracing::info!(fingerprint = %fingerprint, "Answered from result cache");
            return Ok(CreateOutcome::Cached {
                job_id: cached_job_id(&fingerprint),
                plaintext,
            });
        }

        let now = Instant::now();
        let available = self.peers.available_for_team(&request.team_id, now);

        let (job_id, handle) = match self.active.entry(fingerprint.clone()) {
            Entry::Occupied(existing) => {
                let job_id = *existing.get();
                tracing::info!(job_id = %job_id, requested_by = %request.requested_by, "Joined active job");
                return Ok(CreateOutcome::Joined { job_id });
            }
            Entry::Vacant(slot) => {
                // A job may have completed between the first lookup and taking this slot.
                if let Some(plaintext) = self.cache.plaintext(&fingerprint) {
                    return Ok(CreateOutcome::Cached {
                        job_id: cached_job_id(&fingerprint),
                        plaintext,
                    });
                }
                let job_id = Uuid::new_v4();
                let chunks = partition(&request.wordlist_refs, available.len());
                let handle = Arc::new(Mutex::new(Job::new(job_id, &request, chunks)));
                self.jobs.insert(job_id, handle.clone());
                slot.insert(job_id);
                (job_id, handle)
            }
        };

        let mut outbound = vec![Outbound::Team(
            request.team_id.clone(),
            Message::JobCreated {
                job_id,
                hash_type: request.hash_type_info.hash_type.clone(),
                created_by: request.requested_by.clone(),
                wordlist_count: request.wordlist_refs.len(),
            },
        )];
        let status = {
            let mut job = handle.lock();
            let handed = job.fill_from_pending(&available, &[], now)?;
            for assignment in &handed {
                outbound.push(Outbound::Peer(
                    assignment.peer_id.clone(),
                    assignment_message(&job, assignment),
                ));
            }
            job.status
        };

        tracing::info!(
            job_id = %job_id,
            team_id = %request.team_id,
            peers = available.len(),
            status = %status,
            "Job created"
        );
        self.dispatch(outbound).await;
        Ok(CreateOutcome::Created { job_id })
    }

    pub async fn report_progress(
        &self,
        job_id: JobId,
        peer_id: &str,
        report: ProgressReport,
    ) -> Result<()> {
        self.peers.touch(peer_id);
        let handle = self.job(job_id)?;
        let now = Instant::now();

        let (team_id, fields) = {
            let mut job = handle.lock();
            let disposition =
                job.record_progress(peer_id, report.attempted, report.total, report.rate, now);
            if disposition != ReportDisposition::Applied {
                log_discarded(job_id, peer_id, disposition);
                return Ok(());
            }
            (job.team_id.clone(), job.progress_fields())
        };

        let outbound = self.progress_outbound(job_id, team_id, fields, now);
        self.dispatch(outbound.into_iter().collect()).await;
        Ok(())
    }

    /// Parse raw engine status text and apply it to the peer's assignment.
    pub async fn report_engine_output(
        &self,
        job_id: JobId,
        peer_id: &str,
        engine: EngineKind,
        raw: &str,
    ) -> Result<EngineProgress> {
        self.peers.touch(peer_id);
        let handle = self.job(job_id)?;
        let parsed = engine.parse(raw);
        let now = Instant::now();

        let (team_id, fields) = {
            let mut job = handle.lock();
            let disposition = job.record_engine(peer_id, engine, &parsed, now);
            if disposition != ReportDisposition::Applied {
                log_discarded(job_id, peer_id, disposition);
                return Ok(parsed);
            }
            (job.team_id.clone(), job.progress_fields())
        };

        let outbound = self.progress_outbound(job_id, team_id, fields, now);
        self.dispatch(outbound.into_iter().collect()).await;
        Ok(parsed)
    }

    pub async fn report_result(
        &self,
        job_id: JobId,
        peer_id: &str,
        report: ResultReport,
    ) -> Result<ResultAck> {
        self.peers.touch(peer_id);
        let handle = self.job(job_id)?;
        let now = Instant::now();
        let mut outbound = Vec::new();

        let settled = {
            let mut job = handle.lock();
            if !job.has_held_assignment(peer_id) {
                return Err(CoordinatorError::PeerNotFound {
                    job_id,
                    peer_id: peer_id.to_string(),
                });
            }
            match job.status {
                JobStatus::Completed => {
                    return Err(CoordinatorError::ConflictAlreadyCompleted(job_id));
                }
                JobStatus::Cancelled | JobStatus::Failed => {
                    tracing::debug!(job_id = %job_id, peer_id, status = %job.status, "Result for finished job ignored");
                    return Ok(ResultAck { accepted: false });
                }
                JobStatus::Queued | JobStatus::Running => {}
            }

            let settlement = if report.success {
                let plaintext = report
                    .plaintext
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        CoordinatorError::InvalidInput(
                            "success report carries no plaintext".to_string(),
                        )
                    })?;
                job.settle_success(peer_id, plaintext, report.engine)?
            } else {
                job.settle_failure(peer_id, now)?
            };

            match &settlement {
                Settlement::Completed { cancelled } => {
                    for peer in cancelled {
                        outbound.push(Outbound::Peer(
                            peer.clone(),
                            cancelled_message(job_id, Some("Solved by another peer".to_string())),
                        ));
                    }
                }
                Settlement::Reassigned(assignment) => {
                    outbound.push(Outbound::Peer(
                        peer_id.to_string(),
                        assignment_message(&job, assignment),
                    ));
                }
                Settlement::Discarded | Settlement::Failed | Settlement::Recorded => {}
            }

            Settled {
                settlement,
                team_id: job.team_id.clone(),
                fingerprint: job.fingerprint.clone(),
                fields: job.progress_fields(),
                completion: job.is_terminal().then(|| completion_message(&job)),
                result: job.result.clone(),
            }
        };

        match settled.settlement {
            Settlement::Discarded => {
                tracing::debug!(job_id = %job_id, peer_id, "Result from inactive assignment ignored");
                return Ok(ResultAck { accepted: false });
            }
            Settlement::Completed { .. } => {
                if let Some(result) = &settled.result {
                    self.store_result(&settled.fingerprint, result);
                }
                tracing::info!(job_id = %job_id, peer_id, "Job completed");
            }
            Settlement::Failed => {
                tracing::info!(job_id = %job_id, "Job failed: every chunk exhausted");
            }
            Settlement::Reassigned(_) | Settlement::Recorded => {
                tracing::debug!(job_id = %job_id, peer_id, "Chunk exhausted without a match");
            }
        }

        match settled.completion {
            Some(completion) => {
                self.release(&settled.fingerprint, job_id);
                let snapshot = self.progress.finalize(job_id, settled.fields, now);
                outbound.push(Outbound::Team(
                    settled.team_id.clone(),
                    Message::ProgressUpdate(snapshot),
                ));
                outbound.push(Outbound::Team(settled.team_id, completion));
            }
            None => {
                outbound.extend(self.progress_outbound(job_id, settled.team_id, settled.fields, now));
            }
        }

        self.dispatch(outbound).await;
        Ok(ResultAck { accepted: true })
    }

    fn store_result(&self, fingerprint: &str, result: &CrackResult) {
        if let Err(e) = self
            .cache
            .put(fingerprint, &result.plaintext, &result.solved_by)
        {
            tracing::error!(fingerprint, error = %e, "Cache kept its existing entry");
        }
    }

    /// Cancel a live job. Unknown and finished jobs are `JobNotFound`.
    pub async fn cancel_job(&self, job_id: JobId, reason: &str) -> Result<bool> {
        let handle = self.job(job_id)?;
        let now = Instant::now();

        let (team_id, fingerprint, cancelled, fields) = {
            let mut job = handle.lock();
            if job.is_terminal() {
                return Err(CoordinatorError::JobNotFound(job_id));
            }
            let cancelled = job.cancel(reason)?;
            (
                job.team_id.clone(),
                job.fingerprint.clone(),
                cancelled,
                job.progress_fields(),
            )
        };

        self.release(&fingerprint, job_id);
        let snapshot = self.progress.finalize(job_id, fields, now);

        let reason = Some(reason.to_string());
        let mut outbound: Vec<Outbound> = cancelled
            .iter()
            .map(|peer| Outbound::Peer(peer.clone(), cancelled_message(job_id, reason.clone())))
            .collect();
        outbound.push(Outbound::Team(team_id.clone(), Message::ProgressUpdate(snapshot)));
        outbound.push(Outbound::Team(team_id, cancelled_message(job_id, reason)));

        tracing::info!(job_id = %job_id, peers = cancelled.len(), "Job cancelled");
        self.dispatch(outbound).await;
        Ok(true)
    }

    pub fn get_job_status(&self, job_id: JobId) -> Result<JobView> {
        let handle = self.job(job_id)?;
        let view = handle.lock().view();
        Ok(view)
    }

    /// Every stored job, oldest first.
    pub fn list_jobs(&self) -> Vec<JobView> {
        let mut views: Vec<JobView> = self
            .job_handles()
            .iter()
            .map(|handle| handle.lock().view())
            .collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    /// Register a peer and hand it pending chunks of its team's live jobs.
    pub async fn connect_peer(&self, team_id: &str, peer_id: &str) -> Result<()> {
        self.authorize(team_id, peer_id)?;
        self.peers.register(team_id, peer_id);

        let now = Instant::now();
        let newcomer = [peer_id.to_string()];
        let mut outbound = Vec::new();
        let mut updates = Vec::new();

        for handle in self.job_handles() {
            let mut job = handle.lock();
            if job.team_id != team_id || job.pending.is_empty() {
                continue;
            }
            let handed = job.fill_from_pending(&newcomer, &[], now)?;
            if handed.is_empty() {
                continue;
            }
            for assignment in &handed {
                outbound.push(Outbound::Peer(
                    peer_id.to_string(),
                    assignment_message(&job, assignment),
                ));
            }
            updates.push((job.id, job.team_id.clone(), job.progress_fields()));
        }

        if !outbound.is_empty() {
            tracing::info!(peer_id, team_id, chunks = outbound.len(), "Dispatched pending chunks to new peer");
        }
        for (job_id, team, fields) in updates {
            outbound.extend(self.progress_outbound(job_id, team, fields, now));
        }
        self.dispatch(outbound).await;
        Ok(())
    }

    /// Refresh peer liveness. Returns false for unknown peers.
    pub fn heartbeat(&self, peer_id: &str) -> bool {
        self.peers.touch(peer_id)
    }

    /// Forget a peer and reclaim its active assignments.
    ///
    /// Returns how many assignments were reclaimed.
    pub async fn disconnect_peer(&self, peer_id: &str) -> usize {
        let Some(state) = self.peers.unregister(peer_id) else {
            return 0;
        };

        let now = Instant::now();
        let available = self.peers.available_for_team(&state.team_id, now);
        let departed = [peer_id.to_string()];
        let mut reclaimed = 0;
        let mut outbound = Vec::new();
        let mut updates = Vec::new();

        for handle in self.job_handles() {
            let mut job = handle.lock();
            if job.team_id != state.team_id || !job.has_active_assignment(peer_id) {
                continue;
            }
            let reclaim = match job.reclaim(&departed, &available, now) {
                Ok(reclaim) => reclaim,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, peer_id, error = %e, "Failed to reclaim work");
                    continue;
                }
            };
            reclaimed += reclaim.stale.len();
            for assignment in &reclaim.handed {
                outbound.push(Outbound::Peer(
                    assignment.peer_id.clone(),
                    assignment_message(&job, assignment),
                ));
            }
            updates.push((job.id, job.team_id.clone(), job.progress_fields()));
        }

        tracing::info!(peer_id, reclaimed, "Peer disconnected");
        for (job_id, team, fields) in updates {
            outbound.extend(self.progress_outbound(job_id, team, fields, now));
        }
        self.dispatch(outbound).await;
        reclaimed
    }

    /// Reclaim stale assignments, dispatch waiting chunks and collect expired jobs.
    pub async fn sweep(&self, now: Instant) -> SweepReport {
        let stale_after = self.config.stale_after();
        let retention = self.config.job_retention();
        let mut report = SweepReport::default();
        let mut available: HashMap<String, Vec<String>> = HashMap::new();
        let mut outbound = Vec::new();
        let mut updates = Vec::new();
        let mut expired = Vec::new();

        for handle in self.job_handles() {
            let mut job = handle.lock();
            if job.is_terminal() {
                if job.is_expired(now, retention) {
                    expired.push(job.id);
                }
                continue;
            }

            let peers = available
                .entry(job.team_id.clone())
                .or_insert_with(|| self.peers.available_for_team(&job.team_id, now))
                .clone();

            let reclaim = match job.reclaim_stale(now, stale_after, &peers) {
                Ok(reclaim) => reclaim,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Stale sweep failed");
                    continue;
                }
            };
            for peer_id in &reclaim.stale {
                let lapse = CoordinatorError::Timeout {
                    job_id: job.id,
                    peer_id: peer_id.clone(),
                };
                tracing::warn!(job_id = %job.id, peer_id = %peer_id, error = %lapse, "Assignment went stale");
            }

            let mut handed = reclaim.handed;
            match job.fill_from_pending(&peers, &reclaim.stale, now) {
                Ok(more) => handed.extend(more),
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Dispatch of pending chunks failed"),
            }

            report.stale += reclaim.stale.len();
            report.reassigned += handed.len();
            for assignment in &handed {
                outbound.push(Outbound::Peer(
                    assignment.peer_id.clone(),
                    assignment_message(&job, assignment),
                ));
            }
            if !reclaim.stale.is_empty() || !handed.is_empty() {
                updates.push((job.id, job.team_id.clone(), job.progress_fields()));
            }
        }

        for job_id in expired {
            if self.jobs.remove(&job_id).is_some() {
                self.progress.remove(job_id);
                report.collected += 1;
                tracing::debug!(job_id = %job_id, "Collected expired job");
            }
        }

        for (job_id, team, fields) in updates {
            outbound.extend(self.progress_outbound(job_id, team, fields, now));
        }
        self.dispatch(outbound).await;

        if report.stale > 0 || report.collected > 0 {
            tracing::info!(
                stale = report.stale,
                reassigned = report.reassigned,
                collected = report.collected,
                "Sweep finished"
            );
        }
        report
    }

    fn progress_outbound(
        &self,
        job_id: JobId,
        team_id: String,
        fields: ProgressFields,
        now: Instant,
    ) -> Option<Outbound> {
        self.progress
            .update(job_id, fields, now)
            .map(|snapshot| Outbound::Team(team_id, Message::ProgressUpdate(snapshot)))
    }

    async fn dispatch(&self, outbound: Vec<Outbound>) {
        for item in outbound {
            match item {
                Outbound::Peer(peer_id, message) => {
                    if let Err(e) = self.transport.send_to_peer(&peer_id, &message).await {
                        tracing::warn!(peer_id = %peer_id, kind = message.kind(), error = %e, "Failed to deliver message");
                    }
                }
                Outbound::Team(team_id, message) => {
                    match self.transport.broadcast_to_team(&team_id, &message).await {
                        Ok(count) => {
                            tracing::trace!(team_id = %team_id, kind = message.kind(), count, "Broadcast sent")
                        }
                        Err(e) => {
                            tracing::warn!(team_id = %team_id, kind = message.kind(), error = %e, "Broadcast failed")
                        }
                    }
                }
            }
        }
    }
}

struct Settled {
    settlement: Settlement,
    team_id: String,
    fingerprint: String,
    fields: ProgressFields,
    completion: Option<Message>,
    result: Option<CrackResult>,
}

fn assignment_message(job: &Job, assignment: &Assignment) -> Message {
    Message::JobAssignment {
        job_id: job.id,
        peer_id: assignment.peer_id.clone(),
        hash: job.fingerprint.clone(),
        strategy: job.strategy,
        wordlist_chunk: assignment.chunk.clone(),
        hash_type_info: job.hash_type_info.clone(),
    }
}

fn completion_message(job: &Job) -> Message {
    let time_taken = match &job.result {
        Some(result) => result.time_taken_secs,
        None => {
            let end = job.terminated_at.unwrap_or_else(Utc::now);
            (end - job.created_at).num_milliseconds().max(0) as f64 / 1000.0
        }
    };
    Message::JobCompleted {
        job_id: job.id,
        success: job.status == JobStatus::Completed,
        plaintext: job.result.as_ref().map(|r| r.plaintext.clone()),
        time_taken,
        engine_used: job.result.as_ref().and_then(|r| r.engine.clone()),
    }
}

fn cancelled_message(job_id: JobId, reason: Option<String>) -> Message {
    Message::JobCancelled {
        job_id,
        timestamp: Utc::now(),
        reason,
    }
}

fn log_discarded(job_id: JobId, peer_id: &str, disposition: ReportDisposition) {
    match disposition {
        ReportDisposition::UnknownAssignment => {
            tracing::warn!(job_id = %job_id, peer_id, "Report from peer without an assignment")
        }
        _ => tracing::debug!(job_id = %job_id, peer_id, ?disposition, "Report discarded"),
    }
}

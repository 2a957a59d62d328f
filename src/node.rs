use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::api::{run_api, AppState};
use crate::cache::ResultCache;
use crate::collab::{AllowAll, DirectoryResolver, PatternIdentifier, PeerAuthorizer, TeamRoster};
use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::transport::PeerHub;

/// A coordinator process: the shared job state, the peer hub and the API server.
pub struct Node {
    pub config: ServerConfig,
    pub coordinator: Arc<Coordinator>,
    pub hub: Arc<PeerHub>,
    pub roster: Arc<TeamRoster>,
}

impl Node {
    /// Assemble the components. Fails only if an existing cache file cannot be read.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let cache = match &config.cache_path {
            Some(path) => ResultCache::load(path)?,
            None => ResultCache::new(),
        };

        let hub = Arc::new(PeerHub::new());
        let roster = Arc::new(TeamRoster::new());
        let authorizer: Arc<dyn PeerAuthorizer> = if config.open_enrollment {
            tracing::warn!("Open enrollment enabled, any peer may join any team");
            Arc::new(AllowAll)
        } else {
            roster.clone()
        };

        let mut coordinator =
            Coordinator::new(config.coordinator.clone(), hub.clone(), authorizer)
                .with_cache(Arc::new(cache));
        if let Some(dir) = &config.wordlist_dir {
            coordinator = coordinator.with_resolver(Arc::new(DirectoryResolver::new(dir.clone())));
        }

        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
            hub,
            roster,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            coordinator: self.coordinator.clone(),
            hub: self.hub.clone(),
            roster: self.roster.clone(),
            identifier: Arc::new(PatternIdentifier::new()),
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Spawns the monitor loop, then serves the API on the calling task. Once
    /// the server has drained, every peer connection is closed and the cache
    /// is written back.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let monitor_coordinator = self.coordinator.clone();
        let monitor_token = shutdown.clone();
        let monitor = tokio::spawn(async move {
            Self::monitor_loop(monitor_coordinator, monitor_token).await;
        });

        let served = run_api(self.config.listen_addr, self.app_state(), shutdown.clone()).await;

        // The server may have failed on its own; stop the monitor either way.
        shutdown.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "Monitor loop ended abnormally");
        }

        self.hub.shutdown_all().await;
        self.persist_cache();
        served
    }

    /// Sweep for stale assignments, queued chunks and expired jobs on a fixed interval.
    async fn monitor_loop(coordinator: Arc<Coordinator>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(coordinator.config().sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Monitor loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    coordinator.sweep(Instant::now()).await;
                }
            }
        }
    }

    fn persist_cache(&self) {
        let Some(path) = &self.config.cache_path else {
            return;
        };
        if let Err(e) = self.coordinator.cache().save(path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to save result cache");
        }
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Timing for the job coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Assignments silent for this long are reclaimed
    pub stale_after_ms: u64,
    /// Peers silent for this long stop receiving new chunks
    pub peer_timeout_ms: u64,
    /// Minimum gap between progress broadcasts for one job
    pub progress_interval_ms: u64,
    /// How often the monitor loop sweeps for stale work
    pub sweep_interval_ms: u64,
    /// How long terminal jobs stay queryable
    pub job_retention_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
            peer_timeout_ms: 60_000,
            progress_interval_ms: 1_000,
            sweep_interval_ms: 5_000,
            job_retention_secs: 3_600,
        }
    }
}

impl CoordinatorConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn with_stale_after_ms(mut self, ms: u64) -> Self {
        self.stale_after_ms = ms;
        self
    }

    pub fn with_progress_interval_ms(mut self, ms: u64) -> Self {
        self.progress_interval_ms = ms;
        self
    }

    pub fn with_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.sweep_interval_ms = ms;
        self
    }

    pub fn with_job_retention_secs(mut self, secs: u64) -> Self {
        self.job_retention_secs = secs;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub coordinator: CoordinatorConfig,
    /// Solved fingerprints are loaded from and saved to this file
    pub cache_path: Option<PathBuf>,
    /// Directory wordlist references resolve against
    pub wordlist_dir: Option<PathBuf>,
    /// Accept any peer instead of requiring team membership
    pub open_enrollment: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            coordinator: CoordinatorConfig::default(),
            cache_path: None,
            wordlist_dir: None,
            open_enrollment: false,
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    pub fn with_wordlist_dir(mut self, dir: PathBuf) -> Self {
        self.wordlist_dir = Some(dir);
        self
    }

    pub fn with_open_enrollment(mut self, open: bool) -> Self {
        self.open_enrollment = open;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_config_default() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.stale_after(), Duration::from_secs(30));
        assert_eq!(cfg.peer_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.progress_interval(), Duration::from_secs(1));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(5));
        assert_eq!(cfg.job_retention(), Duration::from_secs(3600));
    }

    #[test]
    fn coordinator_config_builders() {
        let cfg = CoordinatorConfig::default()
            .with_stale_after_ms(500)
            .with_progress_interval_ms(0)
            .with_sweep_interval_ms(100)
            .with_job_retention_secs(1);
        assert_eq!(cfg.stale_after_ms, 500);
        assert_eq!(cfg.progress_interval(), Duration::ZERO);
        assert_eq!(cfg.sweep_interval_ms, 100);
        assert_eq!(cfg.job_retention_secs, 1);
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert!(cfg.cache_path.is_none());
        assert!(cfg.wordlist_dir.is_none());
        assert!(!cfg.open_enrollment);
    }

    #[test]
    fn server_config_with_paths() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr)
            .with_cache_path(PathBuf::from("/var/lib/crackteam/cache.json"))
            .with_wordlist_dir(PathBuf::from("/srv/wordlists"))
            .with_open_enrollment(true);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(
            cfg.cache_path.as_deref(),
            Some(std::path::Path::new("/var/lib/crackteam/cache.json"))
        );
        assert!(cfg.wordlist_dir.is_some());
        assert!(cfg.open_enrollment);
    }
}

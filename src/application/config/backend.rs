use std::time::Duration;

use serde::Deserialize;

/// Checker pipeline settings (`backend` section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BackendConfig {
    /// Run the checker inside the frontend process
    pub enabled: bool,
    /// Seconds between two checks of the same (mirror, repo) pair
    pub rescan_interval: u64,
    pub user_agent: String,
    /// Capacity of both the task and the result queue
    pub queue_capacity: usize,
    pub tick_ms: u64,
    pub dispatch_stagger_ms: u64,
    pub probe_timeout_secs: u64,
    pub max_concurrent_probes: usize,
    pub commit_tick_ms: u64,
    /// Flush a partial batch once results have waited this long
    pub commit_linger_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rescan_interval: 7200,
            user_agent: "mirrorlist_updater".to_string(),
            queue_capacity: 20,
            tick_ms: 1000,
            dispatch_stagger_ms: 100,
            probe_timeout_secs: 5,
            max_concurrent_probes: 32,
            commit_tick_ms: 100,
            commit_linger_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn dispatch_stagger(&self) -> Duration {
        Duration::from_millis(self.dispatch_stagger_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn commit_tick(&self) -> Duration {
        Duration::from_millis(self.commit_tick_ms)
    }

    pub fn commit_linger(&self) -> Duration {
        Duration::from_secs(self.commit_linger_secs)
    }
}

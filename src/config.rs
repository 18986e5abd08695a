//! Runtime configuration, read from the environment at startup.
//!
//! Matches the teacher's direct `std::env::var` style (`bin/run.rs`); a
//! config-file layer isn't warranted at this scale, and the teacher doesn't
//! carry one either.
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Restrict the watch to a single namespace, or watch cluster-wide when unset.
    pub watch_namespace: Option<String>,
    /// Deadline applied to each reconcile pass's cluster/dispatch calls (§5).
    pub reconcile_timeout: Duration,
    /// Base delay for the exponential backoff on transient errors (§5, §7).
    pub backoff_base: Duration,
    /// Cap for the exponential backoff on transient errors (§5, §7).
    pub backoff_cap: Duration,
    /// How often to requeue while teardown is blocked waiting on a running job (§4.5, §7).
    pub teardown_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            reconcile_timeout: Duration::from_secs(45),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(300),
            teardown_poll_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ns) = std::env::var("RUNNERSET_WATCH_NAMESPACE") {
            if !ns.is_empty() {
                config.watch_namespace = Some(ns);
            }
        }
        if let Some(v) = parse_secs_env("RUNNERSET_RECONCILE_TIMEOUT_SECS") {
            config.reconcile_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_secs_env("RUNNERSET_BACKOFF_BASE_SECS") {
            config.backoff_base = Duration::from_secs(v);
        }
        if let Some(v) = parse_secs_env("RUNNERSET_BACKOFF_CAP_SECS") {
            config.backoff_cap = Duration::from_secs(v);
        }
        if let Some(v) = parse_secs_env("RUNNERSET_TEARDOWN_POLL_SECS") {
            config.teardown_poll_interval = Duration::from_secs(v);
        }

        config
    }

    /// Exponential backoff for the `attempt`-th consecutive transient error
    /// (0-indexed), clamped to `backoff_cap`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.backoff_base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        scaled.min(self.backoff_cap)
    }
}

fn parse_secs_env(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let config = Config::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(20), Duration::from_secs(300));
    }
}

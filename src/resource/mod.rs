//! Cluster object types: the root `EphemeralRunnerSet`, its child
//! `EphemeralRunner`, and the embedded proxy configuration shape.
mod proxy;
mod runner;
mod runner_set;
mod schemas;

pub use proxy::{ProxyConfig, ProxyServerConfig};
pub use runner::{
    EphemeralRunner, EphemeralRunnerSpec, EphemeralRunnerStatus, RunnerPhase, RunnerTemplateSpec,
};
pub use runner_set::{EphemeralRunnerSet, EphemeralRunnerSetSpec, EphemeralRunnerSetStatus};

/// Deterministic name of the derived ProxySecret for a given RunnerSet name.
pub fn proxy_secret_name(runner_set_name: &str) -> String {
    format!("{runner_set_name}-runner-proxy-config")
}

/// Stable finalizer key blocking physical removal until teardown completes.
pub const FINALIZER: &str = "ephemeralrunnerset.actions.github.com/finalizer";

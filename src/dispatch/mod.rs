//! §4.2 DispatchClientFactory and the external Actions dispatch service
//! surface this controller depends on (§6 "External dispatch service").
pub mod client;

pub use client::{DispatchClientFactory, HttpDispatchClient, ProxySettings};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dispatch service unreachable: {0}")]
    Transient(#[source] reqwest::Error),
    #[error("dispatch service returned {status}: {body}")]
    Remote {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Minimal async surface this controller needs from the external dispatch
/// service. A trait so the Reconciler and its tests can depend on a fake.
#[async_trait::async_trait]
pub trait DispatchClient: Send + Sync {
    /// Deregister a configured runner by `runner_id` within `scale_set_id`.
    /// Idempotent: a 404-equivalent response is treated as success.
    async fn deregister_runner(&self, scale_set_id: i32, runner_id: i64) -> Result<()>;

    /// Rescind a pending (not-yet-configured) assignment for `runner_name`
    /// within `scale_set_id`. Idempotent for the same reason.
    async fn cancel_pending(&self, scale_set_id: i32, runner_name: &str) -> Result<()>;
}

use thiserror::Error;

use crate::{dispatch, proxy_secret};

#[derive(Debug, Error)]
pub enum Error {
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("failed to materialize proxy secret: {0}")]
    ProxySecret(#[from] proxy_secret::Error),

    #[error("dispatch service error: {0}")]
    Dispatch(#[from] dispatch::Error),

    #[error("failed to build dispatch client: {0}")]
    DispatchClientBuild(#[from] reqwest::Error),

    #[error("EphemeralRunnerSet {0} has no namespace")]
    MissingNamespace(String),

    #[error("referenced secret {0} has no {1} key")]
    MalformedSecret(String, &'static str),

    #[error("referenced secret {0} is not valid UTF-8 in key {1}")]
    NonUtf8Secret(String, &'static str),

    #[error("failed to allocate a unique name for a new EphemeralRunner under {0} after retries")]
    NameGenerationExhausted(String),

    #[error("teardown blocked: {0} owned runner(s) still draining")]
    TeardownBlocked(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// §7 error-disposition classification: does this error warrant a
    /// backoff requeue, or should it surface via status/events and wait for
    /// the spec to change?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code >= 500 || resp.code == 409,
            Error::Kube(_) => true,
            Error::Finalizer(inner) => match inner.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(e)
                | kube::runtime::finalizer::Error::CleanupFailed(e) => e.is_retryable(),
                _ => true,
            },
            Error::ProxySecret(proxy_secret::Error::DependencyMissing(_)) => true,
            Error::Dispatch(dispatch::Error::Transient(_)) => true,
            Error::Dispatch(dispatch::Error::Remote { status, .. }) => status.is_server_error(),
            Error::DispatchClientBuild(_) => true,
            Error::MissingNamespace(_)
            | Error::MalformedSecret(..)
            | Error::NonUtf8Secret(..)
            | Error::NameGenerationExhausted(_) => false,
            Error::TeardownBlocked(_) => true,
        }
    }
}

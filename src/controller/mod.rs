//! The reconcile loop itself: wiring, shared `Context`, and the
//! finalizer-gated Apply/Cleanup dispatch (§4.4, §4.5).
mod proxy;
mod scale;
mod secrets;
mod status;
mod teardown;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    runtime::{
        controller::Action,
        events::{Event as K8sEvent, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event},
        watcher, Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, field, info, instrument, warn, Span};

use crate::config::Config;
use crate::dispatch::DispatchClientFactory;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::resource::{EphemeralRunner, EphemeralRunnerSet, FINALIZER};
use crate::telemetry;

const REPORTER: &str = "ephemeralrunnerset-controller";

/// Shared state handed to every reconcile and cleanup invocation.
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub dispatch_factory: DispatchClientFactory,
    pub metrics: Metrics,
    /// Registers `metrics`' families so an embedder can expose them on its
    /// own `/metrics` surface (§11 — this binary carries no HTTP server).
    pub metrics_registry: Registry,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
}

/// Surfaced for an embedder's health/metrics endpoint; this binary doesn't
/// expose one itself (no outer HTTP surface is in scope).
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: REPORTER.into(),
        }
    }
}

impl Diagnostics {
    /// A `Recorder` bound to `rs`, so reconcile-path errors surface as
    /// `kubectl describe`-visible events rather than only log lines (§10.1).
    fn recorder(&self, client: Client, rs: &EphemeralRunnerSet) -> Recorder {
        Recorder::new(client, self.reporter.clone(), rs.object_ref(&()))
    }
}

pub async fn run(client: Client, config: Config) {
    let runner_sets: Api<EphemeralRunnerSet> = match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let runners: Api<EphemeralRunner> = match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    if let Err(e) = runner_sets.list(&Default::default()).await {
        error!("EphemeralRunnerSet CRD is not queryable; {e}. Is the CRD installed?");
    }

    let mut metrics_registry = Registry::default();
    let metrics = Metrics::new().register(&mut metrics_registry);

    let ctx = Arc::new(Context {
        client,
        config,
        dispatch_factory: DispatchClientFactory::new(),
        metrics,
        metrics_registry,
        diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
    });

    Controller::new(runner_sets, watcher::Config::default())
        .owns(runners, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(?action, name = %obj.name, "reconciled"),
                Err(e) => warn!("reconcile failed to complete: {e}"),
            }
        })
        .await;
}

#[instrument(skip(rs, ctx), fields(trace_id))]
async fn reconcile(rs: Arc<EphemeralRunnerSet>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::current_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = rs
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(rs.name_any()))?;
    let api: Api<EphemeralRunnerSet> = Api::namespaced(ctx.client.clone(), &ns);

    info!(name = %rs.name_any(), namespace = %ns, "reconciling EphemeralRunnerSet");

    finalizer(&api, FINALIZER, rs, |event| async {
        match event {
            Event::Apply(rs) => apply(&rs, &ns, ctx.clone()).await,
            Event::Cleanup(rs) => teardown::cleanup(&rs, &ns, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// §4.4 steps 3-8, in the teacher's early-return style: each phase may
/// short-circuit the pass with a requeue action, otherwise falls through to
/// the next.
async fn apply(rs: &EphemeralRunnerSet, ns: &str, ctx: Arc<Context>) -> Result<Action> {
    if let Some(action) = proxy::reconcile(rs, ns, ctx.clone()).await? {
        return Ok(action);
    }

    scale::reconcile(rs, ns, &ctx).await?;
    status::update(rs, ns, &ctx).await?;

    Ok(Action::requeue(ctx.config.reconcile_timeout))
}

fn error_policy(rs: Arc<EphemeralRunnerSet>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(name = %rs.name_any(), "reconcile failed: {error}");
    ctx.metrics.record_failure(error_kind(error));

    let client = ctx.client.clone();
    let diagnostics = ctx.diagnostics.clone();
    let note = error.to_string();
    tokio::spawn(async move {
        let recorder = diagnostics.read().await.recorder(client, &rs);
        let _ = recorder
            .publish(K8sEvent {
                type_: EventType::Warning,
                reason: "ReconcileFailed".into(),
                note: Some(note),
                action: "Reconciling".into(),
                secondary: None,
            })
            .await;
    });

    if is_teardown_blocked(error) {
        // §4.5: poll at a slower, dedicated cadence while waiting on a
        // running job or on a prior pass's deletes to land, rather than the
        // tighter transient-error backoff.
        Action::requeue(ctx.config.teardown_poll_interval)
    } else if error.is_retryable() {
        Action::requeue(ctx.config.backoff_base)
    } else {
        // Validation-shaped errors (§7): surface via status/events and wait
        // for the spec to change rather than retrying blindly.
        Action::await_change()
    }
}

/// Looks through the `kube::runtime::finalizer` wrapping around the Cleanup
/// closure's error so `TeardownBlocked` still gets its own requeue cadence.
fn is_teardown_blocked(error: &Error) -> bool {
    match error {
        Error::TeardownBlocked(_) => true,
        Error::Finalizer(inner) => matches!(
            inner.as_ref(),
            kube::runtime::finalizer::Error::CleanupFailed(Error::TeardownBlocked(_))
        ),
        _ => false,
    }
}

fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::Kube(_) => "kube",
        Error::Finalizer(_) => "finalizer",
        Error::ProxySecret(_) => "proxy_secret",
        Error::Dispatch(_) => "dispatch",
        Error::DispatchClientBuild(_) => "dispatch_client_build",
        Error::MissingNamespace(_) => "missing_namespace",
        Error::MalformedSecret(..) => "malformed_secret",
        Error::NonUtf8Secret(..) => "non_utf8_secret",
        Error::NameGenerationExhausted(_) => "name_generation_exhausted",
        Error::TeardownBlocked(_) => "teardown_blocked",
    }
}

/// Owner reference pinning a child object (Runner or ProxySecret) to its
/// parent RunnerSet, so garbage collection acts as a safety net alongside
/// the explicit finalizer-driven teardown (§9).
pub(crate) fn to_owner_reference(rs: &EphemeralRunnerSet) -> OwnerReference {
    OwnerReference {
        api_version: EphemeralRunnerSet::api_version(&()).to_string(),
        kind: EphemeralRunnerSet::kind(&()).to_string(),
        name: rs.name_any(),
        uid: rs.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

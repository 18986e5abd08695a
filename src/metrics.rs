//! Reconcile metrics, grounded on the `kube.rs` controller-rs family's
//! `metrics.rs` convention (e.g. `pando85/echo-operator-rs`). `register`
//! is called once in `controller::run` against `Context::metrics_registry`;
//! this binary doesn't expose an HTTP `/metrics` endpoint itself (no outer
//! HTTP surface is in scope, per spec.md's Non-goals), but an embedder can
//! read that registry directly off the `Context`.
use std::time::Instant;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
}

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub reconcile_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reconciliations: Counter::default(),
            failures: Family::default(),
            reconcile_duration: Histogram::new(
                [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0].into_iter(),
            ),
        }
    }

    pub fn register(self, registry: &mut Registry) -> Self {
        registry.register(
            "runnerset_reconciliations",
            "Total reconcile passes",
            self.reconciliations.clone(),
        );
        registry.register(
            "runnerset_reconcile_failures",
            "Reconcile passes that returned an error, by error kind",
            self.failures.clone(),
        );
        registry.register(
            "runnerset_reconcile_duration_seconds",
            "Reconcile pass duration",
            self.reconcile_duration.clone(),
        );
        self
    }

    pub fn count_and_measure(&self) -> ReconcileTimer<'_> {
        self.reconciliations.inc();
        ReconcileTimer {
            metrics: self,
            start: Instant::now(),
        }
    }

    pub fn record_failure(&self, kind: &str) {
        self.failures
            .get_or_create(&ErrorLabels {
                kind: kind.to_owned(),
            })
            .inc();
    }
}

/// Drop guard recording reconcile duration when the reconcile pass ends,
/// mirroring the teacher family's `count_and_measure` helper.
pub struct ReconcileTimer<'a> {
    metrics: &'a Metrics,
    start: Instant,
}

impl Drop for ReconcileTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .reconcile_duration
            .observe(self.start.elapsed().as_secs_f64());
    }
}

//! Structured logging setup and a per-reconcile trace id, following the
//! teacher's `tracing`/`tracing-subscriber` wiring in `bin/run.rs`.
use tracing_subscriber::fmt::format::FmtSpan;

/// Initialize the global `tracing` subscriber from `RUST_LOG`, defaulting to
/// info-level for dependencies and debug for this crate.
pub fn init() {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,kube=info,runnerset_controller=debug".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .init();
}

/// A short id identifying the current reconcile pass for log correlation,
/// derived from the current tracing span rather than a random generator so
/// it's stable across the whole pass.
pub fn current_trace_id() -> String {
    tracing::Span::current()
        .id()
        .map(|id| format!("{:x}", id.into_u64()))
        .unwrap_or_else(|| "-".to_owned())
}

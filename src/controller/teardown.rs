//! §4.5 FinalizerOrchestrator — the deletion cascade run once
//! `deletionTimestamp` is set. Drains Runners (respecting running jobs),
//! deregisters them with the external dispatch service, removes the
//! derived ProxySecret, and only then lets `kube::runtime::finalizer`
//! clear the finalizer.
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::DeleteParams,
    runtime::controller::Action,
    Api, ResourceExt,
};
use tracing::debug;

use super::Context;
use crate::error::{Error, Result};
use crate::resource::{proxy_secret_name, EphemeralRunner, EphemeralRunnerSet, RunnerPhase};

/// `kube::runtime::finalizer::finalizer` strips the finalizer string as soon
/// as this returns `Ok(_)` — the `Action` it carries only schedules a
/// requeue *after* removal. So the finalizer must be kept (by returning
/// `Err`) for every pass where an owned Runner still exists, whether it's
/// blocked on a running job or its delete was merely just issued: only the
/// pass that observes zero owned Runners, after the ProxySecret is gone too,
/// may return `Ok` (§4.5, I4, P3).
pub async fn cleanup(rs: &EphemeralRunnerSet, ns: &str, ctx: Arc<Context>) -> Result<Action> {
    let api: Api<EphemeralRunner> = Api::namespaced(ctx.client.clone(), ns);
    let runners = super::scale::list_owned(&api, rs).await?;

    if runners.is_empty() {
        delete_proxy_secret(rs, ns, &ctx).await;
        return Ok(Action::await_change());
    }

    // Running-job Runners are still respected during teardown: wait for the
    // child controller to drive them to a terminal phase before touching
    // anything, so a job-holding Runner is never raced against deletion.
    if runners.iter().any(EphemeralRunner::has_job) {
        debug!("deferring teardown: a runner is still executing a job");
        return Err(Error::TeardownBlocked(runners.len()));
    }

    let dispatch = super::scale::build_dispatch_client(rs, ns, &ctx).await?;
    let scale_set_id = rs.spec.runner_template.runner_scale_set_id;

    for runner in &runners {
        // Unlike scale-down (I5), teardown reaps Failed runners too — every
        // Runner is going away regardless of phase.
        if runner.runner_id() != 0 {
            dispatch
                .deregister_runner(scale_set_id, runner.runner_id())
                .await
                .map_err(Error::Dispatch)?;
        } else if runner.phase() == RunnerPhase::Pending {
            dispatch
                .cancel_pending(scale_set_id, &runner.name_any())
                .await
                .map_err(Error::Dispatch)?;
        }

        match api.delete(&runner.name_any(), &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    // Deletes were only just issued; a future pass re-lists to confirm the
    // population actually drained before the finalizer can come off.
    Err(Error::TeardownBlocked(runners.len()))
}

/// Best-effort: the owner reference on the Secret is the safety net if this
/// never runs (§9 "Owner references vs. explicit cleanup").
async fn delete_proxy_secret(rs: &EphemeralRunnerSet, ns: &str, ctx: &Arc<Context>) {
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), ns);
    let name = proxy_secret_name(&rs.name_any());
    match secrets.delete(&name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(resp)) if resp.code == 404 => {}
        Err(e) => tracing::warn!("best-effort ProxySecret delete failed: {e}"),
    }
}

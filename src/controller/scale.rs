//! Scale phase of the reconcile pass (§4.4 steps 4-7): list owned Runners,
//! run the pure RunnerSelector, then issue creates/deletes. A single pass
//! never both creates and deletes the same Runner (the selector's output
//! sets are disjoint by construction).
use std::collections::BTreeMap;
use std::sync::Arc;

use kube::{
    api::{DeleteParams, ListParams, ObjectMeta, PostParams},
    Api, ResourceExt,
};
use rand::Rng;
use tracing::debug;

use super::Context;
use crate::dispatch::{DispatchClient, HttpDispatchClient};
use crate::error::{Error, Result};
use crate::resource::{proxy_secret_name, EphemeralRunner, EphemeralRunnerSet, EphemeralRunnerSpec};
use crate::selector::{self, Decision, Deletion, DeletionReason, RunnerSnapshot};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const INSTANCE_LABEL: &str = "actions.github.com/runner-set";
const MANAGER: &str = "ephemeralrunnerset-controller";

/// §4.4 steps 4-7. Returns the `Decision` that was applied, so the status
/// phase (§4.4 step 8) can recompute counters without listing again.
pub async fn reconcile(rs: &EphemeralRunnerSet, ns: &str, ctx: &Arc<Context>) -> Result<Decision> {
    let api: Api<EphemeralRunner> = Api::namespaced(ctx.client.clone(), ns);
    let runners = list_owned(&api, rs).await?;

    let snapshots: Vec<RunnerSnapshot> = runners.iter().map(to_snapshot).collect();
    let decision = selector::select(&snapshots, rs.replicas(), rs.spec.patch_id);

    let dispatch = if needs_dispatch(&decision) {
        Some(build_dispatch_client(rs, ns, ctx).await?)
    } else {
        None
    };

    for deletion in &decision.to_delete {
        delete_one(&api, rs, &runners, deletion, dispatch.as_ref()).await?;
    }

    for _ in 0..decision.to_create {
        create_one(&api, rs, ns).await?;
    }

    Ok(decision)
}

fn needs_dispatch(decision: &Decision) -> bool {
    decision
        .to_delete
        .iter()
        .any(|d| d.reason != DeletionReason::Reap)
}

pub(super) async fn build_dispatch_client(
    rs: &EphemeralRunnerSet,
    ns: &str,
    ctx: &Arc<Context>,
) -> Result<Arc<HttpDispatchClient>> {
    let token =
        super::secrets::fetch_token(&ctx.client, ns, &rs.spec.runner_template.github_config_secret)
            .await?;
    let proxy = super::proxy::resolve_settings(rs, ns, ctx).await?;
    ctx.dispatch_factory
        .get_or_build(&rs.spec.runner_template.github_config_url, &token, &proxy)
        .map_err(Error::DispatchClientBuild)
}

pub(super) async fn list_owned(
    api: &Api<EphemeralRunner>,
    rs: &EphemeralRunnerSet,
) -> Result<Vec<EphemeralRunner>> {
    let lp = ListParams::default().labels(&format!("{INSTANCE_LABEL}={}", rs.name_any()));
    let list = api.list(&lp).await?;
    let uid = rs.uid();
    Ok(list
        .items
        .into_iter()
        // I1: only ever act on Runners actually owned by this RunnerSet.
        .filter(|r| r.owner_references().iter().any(|o| Some(&o.uid) == uid.as_ref()))
        .collect())
}

fn to_snapshot(r: &EphemeralRunner) -> RunnerSnapshot {
    RunnerSnapshot {
        name: r.name_any(),
        phase: r.phase(),
        runner_id: r.runner_id(),
        job_request_id: r.job_request_id(),
        patch_id: r.spec.patch_id,
    }
}

async fn delete_one(
    api: &Api<EphemeralRunner>,
    rs: &EphemeralRunnerSet,
    runners: &[EphemeralRunner],
    deletion: &Deletion,
    dispatch: Option<&Arc<HttpDispatchClient>>,
) -> Result<()> {
    let scale_set_id = rs.spec.runner_template.runner_scale_set_id;
    match deletion.reason {
        DeletionReason::Reap => {}
        DeletionReason::CancelPending => {
            dispatch
                .expect("dispatch client built whenever a non-Reap deletion is scheduled")
                .cancel_pending(scale_set_id, &deletion.name)
                .await
                .map_err(Error::Dispatch)?;
        }
        DeletionReason::Deregister => {
            let runner_id = runners
                .iter()
                .find(|r| r.name_any() == deletion.name)
                .map(EphemeralRunner::runner_id)
                .unwrap_or(0);
            dispatch
                .expect("dispatch client built whenever a non-Reap deletion is scheduled")
                .deregister_runner(scale_set_id, runner_id)
                .await
                .map_err(Error::Dispatch)?;
        }
    }

    match api.delete(&deletion.name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        // NotFound on delete: the runner is already gone, treat as success (§7).
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn create_one(api: &Api<EphemeralRunner>, rs: &EphemeralRunnerSet, ns: &str) -> Result<()> {
    const ATTEMPTS: u32 = 5;
    for attempt in 0..ATTEMPTS {
        let name = format!("{}-{}", rs.name_any(), random_suffix());
        let runner = build_runner(rs, ns, &name);
        match api.create(&PostParams::default(), &runner).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                debug!(attempt, %name, "runner name collided, retrying with a fresh suffix");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::NameGenerationExhausted(rs.name_any()))
}

fn build_runner(rs: &EphemeralRunnerSet, ns: &str, name: &str) -> EphemeralRunner {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_owned(), MANAGER.to_owned());
    labels.insert(INSTANCE_LABEL.to_owned(), rs.name_any());

    let proxy_secret_ref = rs
        .spec
        .runner_template
        .proxy
        .as_ref()
        .map(|_| proxy_secret_name(&rs.name_any()));

    EphemeralRunner {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(ns.to_owned()),
            labels: Some(labels),
            owner_references: Some(vec![super::to_owner_reference(rs)]),
            ..ObjectMeta::default()
        },
        spec: EphemeralRunnerSpec {
            template: rs.spec.runner_template.clone(),
            patch_id: rs.spec.patch_id,
            proxy_secret_ref,
        },
        status: None,
    }
}

fn random_suffix() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

//! §4.4 step 8: recompute `.status` from the observed Runner population and
//! patch it via server-side apply. Safe to no-op, following the teacher's
//! `conditions.rs` SSA pattern.
use std::sync::Arc;

use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, ResourceExt,
};

use super::scale::INSTANCE_LABEL;
use super::Context;
use crate::error::Result;
use crate::resource::{EphemeralRunner, EphemeralRunnerSet, EphemeralRunnerSetStatus, RunnerPhase};

const FIELD_MANAGER: &str = "ephemeralrunnerset-controller";

pub async fn update(rs: &EphemeralRunnerSet, ns: &str, ctx: &Arc<Context>) -> Result<()> {
    let runners_api: Api<EphemeralRunner> = Api::namespaced(ctx.client.clone(), ns);
    let lp = ListParams::default().labels(&format!("{INSTANCE_LABEL}={}", rs.name_any()));
    let list = runners_api.list(&lp).await?;
    let uid = rs.uid();
    let owned = list
        .items
        .iter()
        .filter(|r| r.owner_references().iter().any(|o| Some(&o.uid) == uid.as_ref()));

    let status = compute(owned);

    let api: Api<EphemeralRunnerSet> = Api::namespaced(ctx.client.clone(), ns);
    api.patch_status(
        &rs.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(serde_json::json!({
            "apiVersion": "actions.github.com/v1alpha1",
            "kind": "EphemeralRunnerSet",
            "status": status,
        })),
    )
    .await?;
    Ok(())
}

fn compute<'a>(runners: impl Iterator<Item = &'a EphemeralRunner>) -> EphemeralRunnerSetStatus {
    let mut status = EphemeralRunnerSetStatus::default();
    let mut current = 0;
    for r in runners {
        match r.phase() {
            RunnerPhase::Pending => {
                status.pending_ephemeral_runners += 1;
                current += 1;
            }
            RunnerPhase::Running => {
                status.running_ephemeral_runners += 1;
                current += 1;
            }
            RunnerPhase::Failed => {
                status.failed_ephemeral_runners += 1;
                current += 1;
            }
            RunnerPhase::Succeeded => {}
        }
    }
    status.current_replicas = current;
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(phase: RunnerPhase) -> EphemeralRunner {
        use crate::resource::{EphemeralRunnerSpec, RunnerTemplateSpec};
        use k8s_openapi::api::core::v1::PodTemplateSpec;

        let mut r = EphemeralRunner::new(
            "r",
            EphemeralRunnerSpec {
                template: RunnerTemplateSpec {
                    github_config_url: "https://example.com".into(),
                    github_config_secret: "secret".into(),
                    runner_scale_set_id: 1,
                    proxy: None,
                    pod_template_spec: PodTemplateSpec::default(),
                },
                patch_id: 0,
                proxy_secret_ref: None,
            },
        );
        r.status = Some(crate::resource::EphemeralRunnerStatus {
            phase,
            runner_id: 0,
            job_request_id: 0,
        });
        r
    }

    #[test]
    fn counts_exclude_succeeded() {
        let runners = vec![
            runner(RunnerPhase::Running),
            runner(RunnerPhase::Pending),
            runner(RunnerPhase::Failed),
            runner(RunnerPhase::Succeeded),
        ];
        let status = compute(runners.iter());
        assert_eq!(status.current_replicas, 3);
        assert_eq!(status.running_ephemeral_runners, 1);
        assert_eq!(status.pending_ephemeral_runners, 1);
        assert_eq!(status.failed_ephemeral_runners, 1);
    }
}

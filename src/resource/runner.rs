use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::proxy::ProxyConfig;
use super::schemas;

/// Fields shared between `EphemeralRunnerSet.spec.runnerTemplate` and the
/// snapshot copied onto every `EphemeralRunner` created from it.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunnerTemplateSpec {
    /// URL identifying the external scope this runner registers against.
    pub github_config_url: String,
    /// Name of a Secret in the same namespace holding the auth token used to
    /// talk to the external dispatch service.
    pub github_config_secret: String,
    /// Identifier assigned by the external service to this pool's scale set.
    #[schemars(schema_with = "schemas::runner_scale_set_id")]
    pub runner_scale_set_id: i32,
    /// Outbound proxy configuration for this runner and its dispatch client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// Opaque pod template passed through to the runner Pod.
    pub pod_template_spec: PodTemplateSpec,
}

/// One worker slot. Created by the Reconciler from the RunnerSet's
/// `runnerTemplate`; its `phase` is driven by the per-runner sub-controller,
/// an external collaborator not implemented here.
#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "actions.github.com",
    version = "v1alpha1",
    kind = "EphemeralRunner",
    plural = "ephemeralrunners",
    shortname = "ephrunner",
    namespaced,
    status = "EphemeralRunnerStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"RunnerId", "type":"integer", "jsonPath":".status.runnerId"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRunnerSpec {
    #[serde(flatten)]
    pub template: RunnerTemplateSpec,
    /// Copied verbatim from the owning RunnerSet at creation time. Used to
    /// detect runners left over from a prior template generation.
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i64")]
    pub patch_id: i64,
    /// Name of the derived ProxySecret, set only when `proxy` is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_secret_ref: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, JsonSchema, Default)]
pub enum RunnerPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRunnerStatus {
    pub phase: RunnerPhase,
    /// Assigned by the external dispatch service. `0` means not yet configured.
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i64")]
    pub runner_id: i64,
    /// Non-zero while the runner is actively executing a job.
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i64")]
    pub job_request_id: i64,
}

impl EphemeralRunner {
    pub fn phase(&self) -> RunnerPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn runner_id(&self) -> i64 {
        self.status.as_ref().map(|s| s.runner_id).unwrap_or(0)
    }

    pub fn job_request_id(&self) -> i64 {
        self.status.as_ref().map(|s| s.job_request_id).unwrap_or(0)
    }

    pub fn has_job(&self) -> bool {
        self.job_request_id() != 0
    }
}

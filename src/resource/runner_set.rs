use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::runner::RunnerTemplateSpec;
use super::schemas;

/// Declarative pool of ephemeral runners. The replica count is a policy of
/// the parent aggregate controller (out of scope here); this controller only
/// reconciles the observed population towards it.
#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "actions.github.com",
    version = "v1alpha1",
    kind = "EphemeralRunnerSet",
    plural = "ephemeralrunnersets",
    shortname = "ers",
    namespaced,
    status = "EphemeralRunnerSetStatus",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Current", "type":"integer", "jsonPath":".status.currentReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRunnerSetSpec {
    /// Desired count of non-finished ephemeral runners.
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i32")]
    pub replicas: i32,
    /// Snapshot used to create every child EphemeralRunner.
    pub runner_template: RunnerTemplateSpec,
    /// Opaque version counter set by the parent aggregate to invalidate
    /// runners created from a stale template.
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i64")]
    pub patch_id: i64,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralRunnerSetStatus {
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i32")]
    pub current_replicas: i32,
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i32")]
    pub pending_ephemeral_runners: i32,
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i32")]
    pub running_ephemeral_runners: i32,
    #[serde(default)]
    #[schemars(schema_with = "schemas::non_negative_i32")]
    pub failed_ephemeral_runners: i32,
}

impl EphemeralRunnerSet {
    pub fn replicas(&self) -> i32 {
        self.spec.replicas.max(0)
    }
}

//! Proxy phase of the reconcile pass (§4.4 step 3): materialize or tear
//! down the derived ProxySecret, and resolve the settings the
//! DispatchClientFactory needs to route through it.
use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Patch, PatchParams},
    runtime::controller::Action,
    Api, ResourceExt,
};

use super::Context;
use crate::dispatch::ProxySettings;
use crate::error::{Error, Result};
use crate::proxy_secret::{self, Credential, ProxySecretData};
use crate::resource::{proxy_secret_name, EphemeralRunnerSet};

const FIELD_MANAGER: &str = "ephemeralrunnerset-controller";

/// Build the flattened secret contents for `rs.spec.runner_template.proxy`,
/// pre-fetching every referenced credential secret (the builder itself is
/// sync, see `proxy_secret::build`).
async fn build_data(rs: &EphemeralRunnerSet, ns: &str, ctx: &Arc<Context>) -> Result<ProxySecretData> {
    let proxy = rs
        .spec
        .runner_template
        .proxy
        .clone()
        .unwrap_or_default();

    let mut refs = Vec::new();
    if let Some(http) = &proxy.http {
        if let Some(r) = &http.credential_secret_ref {
            refs.push(r.clone());
        }
    }
    if let Some(https) = &proxy.https {
        if let Some(r) = &https.credential_secret_ref {
            refs.push(r.clone());
        }
    }

    let mut resolved: HashMap<String, Credential> = HashMap::new();
    for name in refs {
        if let Some(cred) = super::secrets::fetch_credential(&ctx.client, ns, &name).await? {
            resolved.insert(name, cred);
        }
    }

    Ok(proxy_secret::build(&proxy, |name| resolved.get(name).cloned())?)
}

/// §4.4 step 3: create/update the ProxySecret when `spec.proxy` is set,
/// otherwise ensure it's absent (I6). Returns `Some(action)` when it had to
/// requeue (dependency missing), mirroring the teacher's early-return style.
pub async fn reconcile(rs: &EphemeralRunnerSet, ns: &str, ctx: Arc<Context>) -> Result<Option<Action>> {
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), ns);
    let name = proxy_secret_name(&rs.name_any());

    if rs.spec.runner_template.proxy.is_none() {
        if secrets.get_opt(&name).await?.is_some() {
            secrets
                .delete(&name, &kube::api::DeleteParams::default())
                .await?;
        }
        return Ok(None);
    }

    let data = match build_data(rs, ns, &ctx).await {
        Ok(data) => data,
        Err(Error::ProxySecret(e)) => {
            tracing::warn!("proxy secret dependency missing: {e}");
            return Ok(Some(Action::requeue(ctx.config.backoff_base)));
        }
        Err(e) => return Err(e),
    };

    let owner = super::to_owner_reference(rs);
    let string_data_keys = [
        "http_proxy",
        "https_proxy",
        "no_proxy",
        "username",
        "password",
    ];
    let mut string_data = serde_json::Map::new();
    for key in string_data_keys {
        if let Some(value) = data.get(key) {
            string_data.insert(
                key.to_owned(),
                serde_json::Value::String(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    value,
                )),
            );
        }
    }

    secrets
        .patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(serde_json::json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {
                    "name": name,
                    "namespace": ns,
                    "ownerReferences": [owner],
                },
                "type": "Opaque",
                "data": string_data,
            })),
        )
        .await?;

    Ok(None)
}

/// Resolve `ProxySettings` for the DispatchClientFactory from the RunnerSet
/// spec directly (not the derived Secret — the Reconciler already has the
/// plaintext data in hand from `build_data`, and the dispatch client needs
/// it on every scale-down pass, not just when the secret changes).
pub async fn resolve_settings(
    rs: &EphemeralRunnerSet,
    ns: &str,
    ctx: &Arc<Context>,
) -> Result<ProxySettings> {
    if rs.spec.runner_template.proxy.is_none() {
        return Ok(ProxySettings::default());
    }
    let data = build_data(rs, ns, ctx).await?;
    let to_string = |key: &str| {
        data.get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    };
    Ok(ProxySettings {
        https_proxy: to_string("https_proxy"),
        http_proxy: to_string("http_proxy"),
        no_proxy: to_string("no_proxy"),
        username: to_string("username"),
        password: to_string("password"),
    })
}

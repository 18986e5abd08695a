//! Shared helpers for reading opaque `Secret` data referenced from a
//! RunnerSet's spec: the dispatch auth token and proxy credentials.
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, Client};

use crate::error::{Error, Result};
use crate::proxy_secret::Credential;

async fn get_secret(client: &Client, ns: &str, name: &str) -> Result<Option<Secret>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), ns);
    Ok(api.get_opt(name).await?)
}

fn key_bytes<'a>(secret: &'a Secret, name: &str, key: &'static str) -> Result<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.as_slice())
        .ok_or_else(|| Error::MalformedSecret(name.to_owned(), key))
}

/// Fetch the bearer token used to authenticate with the external dispatch
/// service, stored under the `token` key of `githubConfigSecret`.
pub async fn fetch_token(client: &Client, ns: &str, name: &str) -> Result<String> {
    let secret = get_secret(client, ns, name)
        .await?
        .ok_or_else(|| Error::MalformedSecret(name.to_owned(), "token"))?;
    let bytes = key_bytes(&secret, name, "token")?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::NonUtf8Secret(name.to_owned(), "token"))
}

/// Fetch `username`/`password` from a proxy credential secret. Returns
/// `None` when the secret doesn't exist yet (the caller maps this to
/// `proxy_secret::Error::DependencyMissing`).
pub async fn fetch_credential(
    client: &Client,
    ns: &str,
    name: &str,
) -> Result<Option<Credential>> {
    let Some(secret) = get_secret(client, ns, name).await? else {
        return Ok(None);
    };
    let username = key_bytes(&secret, name, "username")?.to_vec();
    let password = key_bytes(&secret, name, "password")?.to_vec();
    Ok(Some(Credential { username, password }))
}

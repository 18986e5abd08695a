use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Proxy, StatusCode};

use super::{DispatchClient, Error, Result};

/// Proxy settings resolved from a ProxySecretBuilder output, ready to be
/// wired into a `reqwest::Client`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub https_proxy: Option<String>,
    pub http_proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.https_proxy.as_deref().unwrap_or(""),
            self.http_proxy.as_deref().unwrap_or(""),
            self.username.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or(""),
        )
    }
}

/// Computes the `Proxy-Authorization: Basic <...>` header value for the
/// given credentials, matching what a configured `reqwest::Proxy` sends.
pub fn proxy_authorization_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Thin client for the external Actions dispatch service.
pub struct HttpDispatchClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpDispatchClient {
    fn build(config_url: &str, token: &str, proxy: &ProxySettings) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(url) = &proxy.https_proxy {
            let mut p = Proxy::https(url)?;
            if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
                p = p.basic_auth(user, pass);
            }
            builder = builder.proxy(p);
        }
        if let Some(url) = &proxy.http_proxy {
            let mut p = Proxy::http(url)?;
            if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
                p = p.basic_auth(user, pass);
            }
            builder = builder.proxy(p);
        }
        // `no_proxy` is carried in the derived ProxySecret for child runners'
        // own clients; the dispatch endpoint itself is a single external
        // host, so there is nothing for this client to exempt.
        let http = builder.build()?;
        Ok(Self {
            http,
            base_url: config_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(Error::Transient)?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            // A 5xx is a transient remote error per §7; surface it the same
            // way so the caller's requeue-with-backoff policy applies.
            return Err(Error::Remote { status, body });
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote { status, body })
    }
}

#[async_trait::async_trait]
impl DispatchClient for HttpDispatchClient {
    async fn deregister_runner(&self, scale_set_id: i32, runner_id: i64) -> Result<()> {
        let url = format!(
            "{}/scalesets/{scale_set_id}/runners/{runner_id}",
            self.base_url
        );
        self.send(self.http.delete(url)).await
    }

    async fn cancel_pending(&self, scale_set_id: i32, runner_name: &str) -> Result<()> {
        let url = format!(
            "{}/scalesets/{scale_set_id}/pending/{runner_name}",
            self.base_url
        );
        self.send(self.http.delete(url)).await
    }
}

/// Produces and caches `HttpDispatchClient`s keyed by a fingerprint of
/// (config URL, token, proxy settings), so unrelated RunnerSets sharing a
/// scope don't each pay for a fresh client and TLS handshake setup.
#[derive(Default)]
pub struct DispatchClientFactory {
    cache: Mutex<HashMap<String, Arc<HttpDispatchClient>>>,
}

impl DispatchClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        config_url: &str,
        token: &str,
        proxy: &ProxySettings,
    ) -> reqwest::Result<Arc<HttpDispatchClient>> {
        let key = format!("{config_url}|{token}|{}", proxy.fingerprint());
        if let Some(client) = self.cache.lock().expect("dispatch client cache poisoned").get(&key) {
            return Ok(client.clone());
        }
        let client = Arc::new(HttpDispatchClient::build(config_url, token, proxy)?);
        self.cache
            .lock()
            .expect("dispatch client cache poisoned")
            .insert(key, client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_authorization_matches_known_vector() {
        // base64("test:password") = dGVzdDpwYXNzd29yZA==
        assert_eq!(
            proxy_authorization_value("test", "password"),
            "Basic dGVzdDpwYXNzd29yZA=="
        );
    }

    #[test]
    fn factory_caches_by_fingerprint() {
        let factory = DispatchClientFactory::new();
        let proxy = ProxySettings::default();
        let a = factory
            .get_or_build("https://example.com", "token-a", &proxy)
            .unwrap();
        let b = factory
            .get_or_build("https://example.com", "token-a", &proxy)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = factory
            .get_or_build("https://example.com", "token-b", &proxy)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

//! Proxy configuration embedded in `EphemeralRunnerSpec.proxy`.
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub http: Option<ProxyServerConfig>,
    pub https: Option<ProxyServerConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_proxy: Vec<String>,
}

impl ProxyConfig {
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none() && self.no_proxy.is_empty()
    }
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServerConfig {
    /// The proxy URL, e.g. `http://proxy.example.com:3128`.
    pub url: String,
    /// Name of a Secret in the same namespace holding `username`/`password` keys.
    pub credential_secret_ref: Option<String>,
}

//! §4.1 ProxySecretBuilder — flattens `spec.proxy` into the single opaque
//! secret consumed by child runners and by the dispatch client.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::resource::ProxyConfig;

/// A resolved credential secret's `username`/`password` bytes, as returned
/// by the fetcher callback. Kept separate from `kube::Secret` so this module
/// has no cluster dependency and stays pure-testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The referenced credential secret does not exist yet. The caller
    /// should requeue with backoff — the secret may be created asynchronously.
    #[error("credential secret {0} not found")]
    DependencyMissing(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Flattened key/value contents of the derived ProxySecret, byte-valued to
/// mirror how Kubernetes Secrets actually store data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxySecretData(pub BTreeMap<String, Vec<u8>>);

impl ProxySecretData {
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }
}

/// Build the flattened secret contents for `proxy`, resolving each
/// referenced credential secret through `fetch_credential`.
///
/// `fetch_credential(secret_name) -> Option<Credential>`; `None` means the
/// secret does not exist (yet).
pub fn build<F>(proxy: &ProxyConfig, mut fetch_credential: F) -> Result<ProxySecretData>
where
    F: FnMut(&str) -> Option<Credential>,
{
    let mut data = BTreeMap::new();

    if let Some(http) = &proxy.http {
        data.insert("http_proxy".to_owned(), http.url.clone().into_bytes());
        insert_userinfo(&mut data, http.credential_secret_ref.as_deref(), &mut fetch_credential)?;
    }
    if let Some(https) = &proxy.https {
        data.insert("https_proxy".to_owned(), https.url.clone().into_bytes());
        insert_userinfo(
            &mut data,
            https.credential_secret_ref.as_deref(),
            &mut fetch_credential,
        )?;
    }
    if !proxy.no_proxy.is_empty() {
        data.insert("no_proxy".to_owned(), proxy.no_proxy.join(",").into_bytes());
    }

    Ok(ProxySecretData(data))
}

fn insert_userinfo<F>(
    data: &mut BTreeMap<String, Vec<u8>>,
    credential_secret_ref: Option<&str>,
    fetch_credential: &mut F,
) -> Result<()>
where
    F: FnMut(&str) -> Option<Credential>,
{
    let Some(secret_name) = credential_secret_ref else {
        return Ok(());
    };
    // A secret referenced by both http and https may already be resolved;
    // re-fetching is cheap and keeps this function free of hidden state.
    let credential = fetch_credential(secret_name)
        .ok_or_else(|| Error::DependencyMissing(secret_name.to_owned()))?;
    data.insert("username".to_owned(), credential.username);
    data.insert("password".to_owned(), credential.password);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ProxyServerConfig;

    fn proxy_with_credential() -> (ProxyConfig, Credential) {
        let cred = Credential {
            username: b"test".to_vec(),
            password: b"password".to_vec(),
        };
        let proxy = ProxyConfig {
            http: Some(ProxyServerConfig {
                url: "http://proxy.example.com:3128".to_owned(),
                credential_secret_ref: Some("proxy-creds".to_owned()),
            }),
            https: Some(ProxyServerConfig {
                url: "https://proxy.example.com:3129".to_owned(),
                credential_secret_ref: Some("proxy-creds".to_owned()),
            }),
            no_proxy: vec!["10.0.0.0/8".to_owned(), "localhost".to_owned()],
        };
        (proxy, cred)
    }

    #[test]
    fn flattens_all_fields_byte_for_byte() {
        let (proxy, cred) = proxy_with_credential();
        let data = build(&proxy, |name| {
            assert_eq!(name, "proxy-creds");
            Some(cred.clone())
        })
        .unwrap();

        assert_eq!(
            data.get("http_proxy"),
            Some(b"http://proxy.example.com:3128".as_slice())
        );
        assert_eq!(
            data.get("https_proxy"),
            Some(b"https://proxy.example.com:3129".as_slice())
        );
        assert_eq!(data.get("no_proxy"), Some(b"10.0.0.0/8,localhost".as_slice()));
        assert_eq!(data.get("username"), Some(b"test".as_slice()));
        assert_eq!(data.get("password"), Some(b"password".as_slice()));
    }

    #[test]
    fn missing_credential_secret_is_dependency_missing() {
        let (proxy, _) = proxy_with_credential();
        let err = build(&proxy, |_| None).unwrap_err();
        assert_eq!(err, Error::DependencyMissing("proxy-creds".to_owned()));
    }

    #[test]
    fn no_credentials_referenced_produces_no_userinfo() {
        let proxy = ProxyConfig {
            http: Some(ProxyServerConfig {
                url: "http://proxy.example.com:3128".to_owned(),
                credential_secret_ref: None,
            }),
            https: None,
            no_proxy: vec![],
        };
        let data = build(&proxy, |_| unreachable!("no credential should be fetched")).unwrap();
        assert!(data.get("username").is_none());
        assert!(data.get("password").is_none());
        assert!(data.get("no_proxy").is_none());
    }

    #[test]
    fn empty_proxy_produces_empty_secret() {
        let data = build(&ProxyConfig::default(), |_| unreachable!()).unwrap();
        assert_eq!(data.0.len(), 0);
    }
}

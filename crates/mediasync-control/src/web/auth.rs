//! API key authentication
//!
//! Keys are kept as SHA-256 digests and compared in constant time. A config
//! file may list plaintext keys; they are hashed on load.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use subtle::ConstantTimeEq;

const HASH_PREFIX: &str = "sha256:";

/// Query parameter accepted on WebSocket upgrades
pub const QUERY_PARAM: &str = "api_key";

/// Authentication configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredAuthConfig", into = "StoredAuthConfig")]
pub struct AuthConfig {
    enabled: bool,
    api_keys: HashSet<String>,
}

/// On-disk form; keys may be plaintext or already hashed
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredAuthConfig {
    enabled: bool,
    api_keys: Vec<String>,
}

impl From<StoredAuthConfig> for AuthConfig {
    fn from(stored: StoredAuthConfig) -> Self {
        let api_keys = stored
            .api_keys
            .into_iter()
            .map(|key| {
                if key.starts_with(HASH_PREFIX) {
                    key
                } else {
                    hash_key(&key)
                }
            })
            .collect();
        Self {
            enabled: stored.enabled,
            api_keys,
        }
    }
}

impl From<AuthConfig> for StoredAuthConfig {
    fn from(config: AuthConfig) -> Self {
        let mut api_keys: Vec<String> = config.api_keys.into_iter().collect();
        api_keys.sort();
        Self {
            enabled: config.enabled,
            api_keys,
        }
    }
}

impl AuthConfig {
    /// Authentication disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Authentication enabled with the given plaintext keys
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Self {
            enabled: true,
            api_keys: keys.into_iter().map(|k| hash_key(k.as_ref())).collect(),
        }
    }

    /// Add a plaintext key and enable authentication
    pub fn add_key(&mut self, key: &str) {
        self.api_keys.insert(hash_key(key));
        self.enabled = true;
    }

    /// Remove a plaintext key
    pub fn remove_key(&mut self, key: &str) -> bool {
        self.api_keys.remove(&hash_key(key))
    }

    /// Whether `key` grants access
    ///
    /// Every stored digest is compared so timing does not depend on which
    /// key matched.
    pub fn validate(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let candidate = hash_key(key);
        let matched = self
            .api_keys
            .iter()
            .fold(subtle::Choice::from(0u8), |acc, stored| {
                acc | stored.as_bytes().ct_eq(candidate.as_bytes())
            });
        matched.into()
    }

    /// Whether requests must carry a key
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of registered keys
    pub fn key_count(&self) -> usize {
        self.api_keys.len()
    }
}

/// Always hashes, so a stored digest cannot be replayed as a key
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

/// Extract the API key from a request
///
/// Checks the `Authorization: Bearer` header, then `X-API-Key`. The query
/// string is only consulted when `allow_query` is set, which the server does
/// for WebSocket upgrades because browsers cannot set headers on them.
pub fn extract_api_key(
    headers: &http::HeaderMap,
    query: Option<&str>,
    allow_query: bool,
) -> Option<String> {
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(api_key_header) = headers.get("X-API-Key") {
        if let Ok(key) = api_key_header.to_str() {
            return Some(key.trim().to_string());
        }
    }

    if !allow_query {
        return None;
    }

    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::KeyAlgorithm;
use jsonwebtoken::jwk::PublicKeyUse;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use crate::error::fetch_jwks_error;
use crate::error::Error;
use crate::error::Result;

/// A public key together with the algorithm its JWK was published for
#[derive(Clone)]
pub struct VerificationKey {
    key: DecodingKey,
    algorithm: Option<Algorithm>,
}

impl VerificationKey {
    pub fn new(key: DecodingKey, algorithm: Option<Algorithm>) -> Self {
        Self { key, algorithm }
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// The JWK `alg`, if the provider declared one
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether a token signed with `alg` may be verified with this key
    pub fn permits(&self, alg: Algorithm) -> bool {
        self.algorithm.is_none() || self.algorithm == Some(alg)
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Verification keys indexed by key ID
///
/// Built from a JWKS document. Once built a key set is never modified; a
/// refresh produces a new one.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

/// JWKS document with each key kept raw, so one key the library cannot parse
/// does not reject the whole document.
#[derive(Deserialize)]
struct RawJwks {
    keys: Vec<serde_json::Value>,
}

impl KeySet {
    /// Parse a JWKS JSON document
    ///
    /// Keys without a `kid`, encryption keys (by `use` or `alg`) and keys that
    /// cannot be turned into a decoding key are skipped. Fails if nothing
    /// usable remains.
    pub fn from_json(document: &str) -> Result<Self> {
        let raw: RawJwks = serde_json::from_str(document)
            .map_err(|e| Error::KeySource(format!("Malformed JWKS document: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawJwks) -> Result<Self> {
        let mut keys = HashMap::new();

        for value in raw.keys {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!(error = %e, "Failed to parse JWK, skipping");
                    continue;
                }
            };

            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };

            if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
                debug!(kid = %kid, "Skipping encryption JWK");
                continue;
            }

            let algorithm = match jwk.common.key_algorithm {
                None => None,
                Some(declared) => match signing_algorithm(declared) {
                    Some(algorithm) => Some(algorithm),
                    None => {
                        debug!(kid = %kid, alg = %declared, "Skipping JWK not meant for signatures");
                        continue;
                    }
                },
            };

            match DecodingKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(kid, VerificationKey::new(key, algorithm));
                }
                Err(e) => {
                    warn!(kid = %kid, error = %e, "Failed to build decoding key from JWK, skipping");
                }
            }
        }

        if keys.is_empty() {
            return Err(Error::KeySource(
                "No usable signing keys found in JWKS".to_string(),
            ));
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in sorted order
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn signing_algorithm(algorithm: KeyAlgorithm) -> Option<Algorithm> {
    match algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("key_ids", &self.key_ids())
            .finish()
    }
}

/// Where signing keys come from
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Produce the current key set
    async fn fetch(&self) -> Result<KeySet>;

    /// Whether the source can change over time and is worth refreshing
    fn is_polling(&self) -> bool;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Key source backed by a literal JWKS document
#[derive(Debug, Clone)]
pub struct StaticKeySource {
    document: String,
}

impl StaticKeySource {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<KeySet> {
        KeySet::from_json(&self.document)
    }

    fn is_polling(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        "static JWKS document".to_string()
    }
}

/// Key source that fetches a JWKS document over HTTP
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    url: String,
    client: Client,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<KeySet> {
        debug!(url = %self.url, "Fetching JWKS");

        let raw: RawJwks = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(fetch_jwks_error)?
            .error_for_status()
            .map_err(fetch_jwks_error)?
            .json()
            .await
            .map_err(fetch_jwks_error)?;

        KeySet::from_raw(raw)
    }

    fn is_polling(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

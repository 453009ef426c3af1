//! Identity provider signing keys.
//!
//! [`JwksClient`] fetches the provider's JSON Web Key Set lazily, keeps it in
//! a moka cache for a configurable TTL and allows a rate-limited refresh when
//! a token names a key-id the cached set does not know. [`StaticKeyProvider`]
//! serves a fixed set for tests and pinned deployments.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use log::{debug, info, warn};
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithms::key_family;
use crate::error::KeyFetchError;

/// Key type (`kty`) of a JSON Web Key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyFamily {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "OKP")]
    Okp,
}

impl FromStr for KeyFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA" => Ok(Self::Rsa),
            "EC" => Ok(Self::Ec),
            "OKP" => Ok(Self::Okp),
            other => Err(format!("unsupported key type '{other}'")),
        }
    }
}

/// A single JSON Web Key as published by the identity provider.
///
/// Only the public fields used for signature verification are kept; any
/// other members of the document are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Curve name for EC and OKP keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// The key set document served at the provider's JWKS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A JWKS document whose records have not been parsed yet, so one odd record
/// cannot reject the whole set
#[derive(Debug, Deserialize)]
struct RawJwkSet {
    keys: Vec<Value>,
}

impl From<RawJwkSet> for JwkSet {
    fn from(raw: RawJwkSet) -> Self {
        let keys = raw
            .keys
            .into_iter()
            .filter_map(|record| {
                let kid = record
                    .get("kid")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                serde_json::from_value::<Jwk>(record)
                    .inspect_err(|e| warn!("Skipping signing key '{kid}': {e}"))
                    .ok()
            })
            .collect();
        Self { keys }
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, String> {
    field
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("missing '{name}'"))
}

/// A verified-usable public key, ready for signature checks
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    jwk: Jwk,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Turn a JWK into a signing key, or explain why it cannot be used
    pub fn from_jwk(jwk: Jwk) -> Result<Self, String> {
        let kid = required(&jwk.kid, "kid")?.to_string();
        let family = KeyFamily::from_str(&jwk.kty)?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(format!("key use '{key_use}' is not 'sig'"));
            }
        }

        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => {
                let alg = Algorithm::from_str(alg)
                    .map_err(|_| format!("unsupported algorithm '{alg}'"))?;
                if key_family(alg) != Some(family) {
                    return Err(format!("algorithm {alg:?} does not match key type {family:?}"));
                }
                Some(alg)
            }
            None => None,
        };

        let decoding_key = match family {
            KeyFamily::Rsa => {
                DecodingKey::from_rsa_components(required(&jwk.n, "n")?, required(&jwk.e, "e")?)
            }
            KeyFamily::Ec => {
                DecodingKey::from_ec_components(required(&jwk.x, "x")?, required(&jwk.y, "y")?)
            }
            KeyFamily::Okp => {
                let crv = required(&jwk.crv, "crv")?;
                if crv != "Ed25519" {
                    return Err(format!("unsupported curve '{crv}'"));
                }
                DecodingKey::from_ed_components(required(&jwk.x, "x")?)
            }
        }
        .map_err(|e| format!("invalid public key material: {e}"))?;

        Ok(Self {
            kid,
            family,
            algorithm,
            jwk,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm pinned by the key's `alg` member, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// The published key record, including its modulus/exponent or curve point
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether this key may verify a token signed with `alg`
    pub fn supports(&self, alg: Algorithm) -> bool {
        if key_family(alg) != Some(self.family) {
            return false;
        }
        if let Some(pinned) = self.algorithm {
            return pinned == alg;
        }
        match (alg, self.jwk.crv.as_deref()) {
            (Algorithm::ES256, Some(crv)) => crv == "P-256",
            (Algorithm::ES384, Some(crv)) => crv == "P-384",
            _ => true,
        }
    }
}

/// Public signing keys indexed by key-id.
///
/// Immutable once built; a refresh produces a new set.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
}

impl SigningKeySet {
    /// Build a set from a JWKS document, skipping keys that cannot be used
    pub fn from_jwks(jwks: JwkSet) -> Self {
        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let kid = jwk.kid.clone().unwrap_or_default();
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(key.kid()) {
                        warn!("Ignoring duplicate signing key '{}'", key.kid());
                        continue;
                    }
                    keys.insert(key.kid().to_string(), key);
                }
                Err(reason) => warn!("Skipping signing key '{kid}': {reason}"),
            }
        }
        Self { keys }
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
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
}

/// Source of the signing keys used by the token validator.
///
/// Implementations must be thread-safe; the returned set is shared read-only.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Current key set, fetching it if nothing is cached yet
    async fn get_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError>;

    /// Discard the cached set and fetch a fresh one.
    ///
    /// Returns `Ok(None)` when a refresh is not permitted right now.
    async fn refresh(&self) -> Result<Option<Arc<SigningKeySet>>, KeyFetchError> {
        Ok(None)
    }
}

/// Tuning for [`JwksClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksOptions {
    /// How long a fetched key set is served from cache
    pub cache_ttl: Duration,
    /// Minimum time between two fetches triggered by unknown key-ids
    pub refresh_interval: Duration,
    /// Request timeout against the JWKS endpoint
    pub timeout: Duration,
}

impl Default for JwksOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            refresh_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Key provider backed by a remote JWKS endpoint
pub struct JwksClient {
    url: String,
    client: Client,
    cache: Cache<(), Arc<SigningKeySet>>,
    refresh_interval: Duration,
    last_fetch: Mutex<Option<Instant>>,
}

impl JwksClient {
    pub fn new(url: impl Into<String>, options: JwksOptions) -> Result<Self, KeyFetchError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| KeyFetchError::Client(e.to_string()))?;

        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(options.cache_ttl)
            .build();

        Ok(Self {
            url: url.into(),
            client,
            cache,
            refresh_interval: options.refresh_interval,
            last_fetch: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        debug!("Fetching signing keys from {}", self.url);
        self.mark_fetched();

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(KeyFetchError::InvalidStatus(response.status()));
        }

        let body = response.bytes().await?;
        let jwks: RawJwkSet = serde_json::from_slice(&body)?;
        let keys = SigningKeySet::from_jwks(jwks.into());

        info!(
            "Loaded {} signing key(s) from {}",
            keys.len(),
            self.url
        );
        Ok(Arc::new(keys))
    }

    fn mark_fetched(&self) {
        if let Ok(mut last_fetch) = self.last_fetch.lock() {
            *last_fetch = Some(Instant::now());
        }
    }

    /// Claims the refresh slot if the last fetch is older than the refresh interval
    fn try_claim_refresh(&self) -> bool {
        let Ok(mut last_fetch) = self.last_fetch.lock() else {
            return false;
        };
        if let Some(at) = *last_fetch {
            if at.elapsed() < self.refresh_interval {
                return false;
            }
        }
        *last_fetch = Some(Instant::now());
        true
    }
}

#[async_trait]
impl KeyProvider for JwksClient {
    async fn get_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        // Concurrent misses share one in-flight fetch
        self.cache
            .try_get_with((), self.fetch())
            .await
            .map_err(|e| (*e).clone())
    }

    async fn refresh(&self) -> Result<Option<Arc<SigningKeySet>>, KeyFetchError> {
        if !self.try_claim_refresh() {
            debug!("Signing key refresh skipped, last fetch is too recent");
            return Ok(None);
        }
        self.cache.invalidate(&()).await;
        self.get_keys().await.map(Some)
    }
}

/// Key provider serving a fixed key set
#[derive(Debug, Clone, Default)]
pub struct StaticKeyProvider {
    keys: Arc<SigningKeySet>,
}

impl StaticKeyProvider {
    pub fn new(keys: SigningKeySet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn get_keys(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        Ok(Arc::clone(&self.keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ed25519_jwk, ed25519_keypair, rsa_jwk, TEST_RSA_KID};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JWKS_PATH: &str = "/.well-known/jwks.json";

    fn client_for(server: &MockServer, options: JwksOptions) -> JwksClient {
        JwksClient::new(format!("{}{}", server.uri(), JWKS_PATH), options)
            .expect("Failed to create JWKS client")
    }

    #[test]
    fn test_signing_key_from_rsa_jwk() {
        let key = SigningKey::from_jwk(rsa_jwk(TEST_RSA_KID)).unwrap();
        assert_eq!(key.kid(), TEST_RSA_KID);
        assert_eq!(key.family(), KeyFamily::Rsa);
        assert_eq!(key.algorithm(), Some(Algorithm::RS256));
        assert_eq!(key.jwk().e.as_deref(), Some("AQAB"));
        assert!(key.supports(Algorithm::RS256));
        assert!(!key.supports(Algorithm::RS512));
        assert!(!key.supports(Algorithm::EdDSA));
    }

    #[test]
    fn test_signing_key_from_okp_jwk() {
        let (_, x) = ed25519_keypair(1);
        let key = SigningKey::from_jwk(ed25519_jwk("ed-1", &x)).unwrap();
        assert_eq!(key.family(), KeyFamily::Okp);
        assert!(key.supports(Algorithm::EdDSA));
        assert!(!key.supports(Algorithm::RS256));
    }

    #[test]
    fn test_unusable_jwks_rejected() {
        let mut no_kid = rsa_jwk("k");
        no_kid.kid = None;
        assert!(SigningKey::from_jwk(no_kid).unwrap_err().contains("kid"));

        let mut encryption = rsa_jwk("k");
        encryption.key_use = Some("enc".into());
        assert!(SigningKey::from_jwk(encryption).is_err());

        let mut symmetric = rsa_jwk("k");
        symmetric.kty = "oct".into();
        assert!(SigningKey::from_jwk(symmetric).is_err());

        let mut mismatched = rsa_jwk("k");
        mismatched.alg = Some("ES256".into());
        assert!(SigningKey::from_jwk(mismatched).is_err());

        let mut no_modulus = rsa_jwk("k");
        no_modulus.n = None;
        assert!(SigningKey::from_jwk(no_modulus).unwrap_err().contains("'n'"));
    }

    #[test]
    fn test_key_set_skips_bad_keys() {
        let mut bad = rsa_jwk("bad");
        bad.kty = "oct".into();
        let set = SigningKeySet::from_jwks(JwkSet {
            keys: vec![rsa_jwk("good"), bad, rsa_jwk("good")],
        });

        assert_eq!(set.len(), 1);
        assert!(set.contains("good"));
        assert!(!set.contains("bad"));
        assert!(set.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_keys_fetched_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [rsa_jwk("k1")] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        let first = client.get_keys().await.unwrap();
        let second = client.get_keys().await.unwrap();

        assert!(first.contains("k1"));
        assert!(Arc::ptr_eq(&first, &second));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_share_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": [rsa_jwk("k1")] }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(client_for(&server, JwksOptions::default()));
        let mut handles = vec![];
        for _ in 0..10 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move { client.get_keys().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().contains("k1"));
        }
        server.verify().await;
    }

    #[tokio::test]
    async fn test_error_status_is_key_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        let err = client.get_keys().await.unwrap_err();
        assert_eq!(
            err,
            KeyFetchError::InvalidStatus(http::StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        assert!(matches!(
            client.get_keys().await,
            Err(KeyFetchError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_records_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [
                    rsa_jwk(TEST_RSA_KID),
                    { "kid": "weird", "use": "enc" },
                    { "kty": "RSA", "kid": 7, "alg": ["RS256"] },
                    "not a key"
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        let keys = client.get_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(TEST_RSA_KID));
    }

    #[tokio::test]
    async fn test_document_without_keys_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issuer": "x" })))
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        assert!(matches!(
            client.get_keys().await,
            Err(KeyFetchError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_request_error() {
        let client = JwksClient::new(
            "http://127.0.0.1:1/.well-known/jwks.json",
            JwksOptions {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(
            client.get_keys().await,
            Err(KeyFetchError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [rsa_jwk("k1")] })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        assert!(client.get_keys().await.is_err());
        assert!(client.get_keys().await.unwrap().contains("k1"));
    }

    #[tokio::test]
    async fn test_refresh_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [rsa_jwk("k1")] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, JwksOptions::default());
        client.get_keys().await.unwrap();
        assert!(client.refresh().await.unwrap().is_none());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_refresh_picks_up_rotated_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [rsa_jwk("old")] })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [rsa_jwk("new")] })),
            )
            .mount(&server)
            .await;

        let client = client_for(
            &server,
            JwksOptions {
                refresh_interval: Duration::ZERO,
                ..Default::default()
            },
        );
        assert!(client.get_keys().await.unwrap().contains("old"));

        let refreshed = client.refresh().await.unwrap().expect("refresh allowed");
        assert!(refreshed.contains("new"));
        assert!(!refreshed.contains("old"));
        assert!(client.get_keys().await.unwrap().contains("new"));
    }

    #[tokio::test]
    async fn test_static_provider_never_refreshes() {
        let provider = StaticKeyProvider::new(SigningKeySet::from_jwks(JwkSet {
            keys: vec![rsa_jwk("k1")],
        }));
        assert!(provider.get_keys().await.unwrap().contains("k1"));
        assert!(provider.refresh().await.unwrap().is_none());
    }
}

//! Bearer token validation against the identity provider's signing keys.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Validation;
use log::{debug, error};
use serde::Deserialize;

use crate::algorithms::AlgorithmPolicy;
use crate::claims::DecodedClaims;
use crate::error::AuthError;
use crate::gate::{self, AuthDecision};
use crate::jwks::{KeyProvider, SigningKey};

/// What a token must satisfy besides a valid signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSettings {
    /// Expected `iss`, compared exactly
    pub issuer: String,
    /// Value that `aud` must contain
    pub audience: String,
    pub policy: AlgorithmPolicy,
    /// Clock skew tolerated on `exp`, in seconds
    pub leeway: u64,
}

impl ValidatorSettings {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            policy: AlgorithmPolicy::default(),
            leeway: 0,
        }
    }

    pub fn with_policy(mut self, policy: AlgorithmPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }
}

#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Read `alg` and `kid` without touching the signature
fn decode_unverified_header(token: &str) -> Result<UnverifiedHeader, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::malformed_token(
            "token must have three dot-separated parts",
        ));
    }

    let raw = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|_| AuthError::malformed_token("token header is not base64url"))?;
    serde_json::from_slice(&raw)
        .map_err(|_| AuthError::malformed_token("token header is not a JSON object"))
}

/// Validates bearer tokens and yields their claims.
///
/// Cheap to share behind an `Arc`; all state lives in the key provider.
pub struct TokenValidator {
    provider: Arc<dyn KeyProvider>,
    settings: ValidatorSettings,
}

impl TokenValidator {
    pub fn new(provider: Arc<dyn KeyProvider>, settings: ValidatorSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Fully validate `token`, returning its claims or the first failure found
    pub async fn validate(&self, token: &str) -> Result<DecodedClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let header = decode_unverified_header(token)?;
        let algorithm = self.settings.policy.check(header.alg.as_deref())?;
        let kid = match header.kid {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(AuthError::malformed_token("token header has no 'kid'")),
        };

        let key = self.find_key(&kid).await?;
        if !key.supports(algorithm) {
            return Err(AuthError::invalid_algorithm(format!(
                "key '{kid}' cannot verify {algorithm:?} signatures"
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = self.settings.leeway;

        let data = jsonwebtoken::decode::<serde_json::Value>(token, key.decoding_key(), &validation)?;
        let claims: DecodedClaims = serde_json::from_value(data.claims)
            .map_err(|e| AuthError::malformed_token(format!("unexpected claim shape: {e}")))?;

        debug!("Validated token for subject {}", claims.subject());
        Ok(claims)
    }

    /// Validate `token` and check it grants `required`
    pub async fn authorize(&self, token: &str, required: &str) -> AuthDecision {
        match self.validate(token).await {
            Ok(claims) => gate::check(claims, required),
            Err(err) => err.into(),
        }
    }

    async fn find_key(&self, kid: &str) -> Result<SigningKey, AuthError> {
        let keys = self.provider.get_keys().await.inspect_err(|e| {
            error!("Failed to load signing keys: {e}");
        })?;
        if let Some(key) = keys.get(kid) {
            return Ok(key.clone());
        }

        debug!("Signing key '{kid}' not cached, attempting refresh");
        let refreshed = self.provider.refresh().await.inspect_err(|e| {
            error!("Failed to refresh signing keys: {e}");
        })?;
        refreshed
            .and_then(|keys| keys.get(kid).cloned())
            .ok_or_else(|| AuthError::UnknownKey {
                kid: kid.to_string(),
            })
    }
}

//! Identity provider configuration

use std::time::Duration;

use bearer_auth::{AlgorithmPolicy, JwksOptions, ValidatorSettings};
use confique::Config;
use url::Url;

/// Identity provider configuration
#[derive(Debug, Config, Clone)]
pub struct AuthConfig {
    /// Identity provider domain, e.g. `tenant.us.auth0.com` (required)
    #[config(env = "DRINKS_AUTH_DOMAIN")]
    pub domain: String,

    /// Audience every token must carry (required)
    #[config(env = "DRINKS_AUTH_AUDIENCE")]
    pub audience: String,

    /// Expected token issuer (default: https://{domain}/)
    #[config(env = "DRINKS_AUTH_ISSUER")]
    pub issuer: Option<String>,

    /// Key set endpoint (default: https://{domain}/.well-known/jwks.json)
    #[config(env = "DRINKS_AUTH_JWKS_URL")]
    pub jwks_url: Option<String>,

    /// Accepted signing algorithms, comma-separated (default: RS256)
    #[config(env = "DRINKS_AUTH_ALGORITHMS", default = "RS256")]
    pub algorithms: String,

    /// How long fetched signing keys are cached, in seconds (default: 3600)
    #[config(env = "DRINKS_AUTH_JWKS_CACHE_TTL", default = 3600)]
    pub jwks_cache_ttl: u64,

    /// Minimum seconds between refreshes caused by unknown key-ids (default: 60)
    #[config(env = "DRINKS_AUTH_JWKS_REFRESH_INTERVAL", default = 60)]
    pub jwks_refresh_interval: u64,

    /// Timeout for key set requests in seconds (default: 5)
    #[config(env = "DRINKS_AUTH_JWKS_TIMEOUT", default = 5)]
    pub jwks_timeout: u64,

    /// Tolerated clock skew on token expiry in seconds (default: 0)
    #[config(env = "DRINKS_AUTH_LEEWAY", default = 0)]
    pub leeway: u64,
}

impl AuthConfig {
    pub fn issuer_url(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| format!("https://{}/", self.domain))
    }

    pub fn jwks_endpoint(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", self.domain))
    }

    /// Get accepted algorithms as a vector
    pub fn get_algorithms(&self) -> Vec<String> {
        self.algorithms
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn jwks_options(&self) -> JwksOptions {
        JwksOptions {
            cache_ttl: Duration::from_secs(self.jwks_cache_ttl),
            refresh_interval: Duration::from_secs(self.jwks_refresh_interval),
            timeout: Duration::from_secs(self.jwks_timeout),
        }
    }

    /// Settings for the token validator; fails on a symmetric or unknown algorithm
    pub fn validator_settings(&self) -> Result<ValidatorSettings, String> {
        let policy = AlgorithmPolicy::new(self.get_algorithms()).map_err(|e| e.to_string())?;
        Ok(ValidatorSettings::new(self.issuer_url(), &self.audience)
            .with_policy(policy)
            .with_leeway(self.leeway))
    }

    /// Reject settings that could never validate a token
    pub fn validate(&self) -> Result<(), String> {
        if self.domain.trim().is_empty() {
            return Err("DRINKS_AUTH_DOMAIN must not be empty".to_string());
        }
        if self.audience.trim().is_empty() {
            return Err("DRINKS_AUTH_AUDIENCE must not be empty".to_string());
        }
        Url::parse(&self.jwks_endpoint()).map_err(|e| format!("Invalid JWKS URL: {e}"))?;
        self.validator_settings().map(|_| ())
    }
}

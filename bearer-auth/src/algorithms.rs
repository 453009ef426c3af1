//! JWT algorithm policy.
//!
//! Signing keys come from a public key set, so only asymmetric algorithms
//! can be trusted. `none` and the HMAC family are rejected before any key
//! lookup, and everything else must be on the configured allowlist.

use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::error::AuthError;
use crate::jwks::KeyFamily;

/// Algorithms that are never accepted, whatever the allowlist says.
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Asymmetric algorithms that may appear on an allowlist.
pub const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Default allowlist, matching what hosted identity providers sign with.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Key family able to verify signatures made with `alg`, `None` for symmetric algorithms
pub fn key_family(alg: Algorithm) -> Option<KeyFamily> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some(KeyFamily::Rsa),
        Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
        Algorithm::EdDSA => Some(KeyFamily::Okp),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
    }
}

fn is_forbidden(alg: &str) -> bool {
    FORBIDDEN_ALGORITHMS
        .iter()
        .any(|forbidden| forbidden.eq_ignore_ascii_case(alg))
}

/// The set of algorithms a validator accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPolicy {
    allowed: Vec<Algorithm>,
}

impl Default for AlgorithmPolicy {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALGORITHMS.to_vec(),
        }
    }
}

impl AlgorithmPolicy {
    /// Build a policy from algorithm names such as `RS256`.
    ///
    /// Fails if the list is empty, names an unknown algorithm, or names a
    /// symmetric one.
    pub fn new<I, S>(names: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if is_forbidden(name) {
                return Err(AuthError::invalid_algorithm(format!(
                    "'{name}' cannot be allowlisted, only asymmetric algorithms are supported"
                )));
            }
            let alg = Algorithm::from_str(name).map_err(|_| {
                AuthError::invalid_algorithm(format!("'{name}' is not a known algorithm"))
            })?;
            if !ASYMMETRIC_ALGORITHMS.contains(&alg) {
                return Err(AuthError::invalid_algorithm(format!(
                    "'{name}' cannot be allowlisted, only asymmetric algorithms are supported"
                )));
            }
            if !allowed.contains(&alg) {
                allowed.push(alg);
            }
        }

        if allowed.is_empty() {
            return Err(AuthError::invalid_algorithm(
                "at least one algorithm must be allowlisted",
            ));
        }

        Ok(Self { allowed })
    }

    pub fn allowed(&self) -> &[Algorithm] {
        &self.allowed
    }

    /// Check the `alg` header of an unverified token.
    ///
    /// A missing `alg` is a malformed token; `none`, HMAC and anything off the
    /// allowlist is an invalid algorithm.
    pub fn check(&self, alg: Option<&str>) -> Result<Algorithm, AuthError> {
        let alg = match alg {
            Some(alg) if !alg.is_empty() => alg,
            _ => return Err(AuthError::malformed_token("token header has no 'alg'")),
        };

        if is_forbidden(alg) {
            return Err(AuthError::invalid_algorithm(format!(
                "'{alg}' is not allowed for security reasons"
            )));
        }

        let parsed = Algorithm::from_str(alg)
            .map_err(|_| AuthError::invalid_algorithm(format!("'{alg}' is not supported")))?;

        if !self.allowed.contains(&parsed) {
            return Err(AuthError::invalid_algorithm(format!(
                "'{alg}' is not in the accepted list"
            )));
        }

        Ok(parsed)
    }
}

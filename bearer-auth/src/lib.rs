//! Bearer token authorization for HTTP services.
//!
//! Tokens are verified against the public keys an identity provider publishes
//! as a JWKS document, checked for issuer, audience and expiry, and finally
//! matched against a required permission string:
//!
//! ```text
//! Authorization header -> header::bearer_token -> TokenValidator::validate -> gate::check
//! ```
//!
//! The crate is framework-agnostic; HTTP status codes are exposed through
//! [`AuthError::status_code`] for the caller to render.

pub mod algorithms;
pub mod claims;
pub mod error;
pub mod gate;
pub mod header;
pub mod jwks;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod validator;

pub use algorithms::AlgorithmPolicy;
pub use claims::{Audience, DecodedClaims};
pub use error::{AuthError, AuthErrorKind, KeyFetchError};
pub use gate::AuthDecision;
pub use header::{bearer_token, parse_bearer};
pub use jwks::{
    Jwk, JwkSet, JwksClient, JwksOptions, KeyFamily, KeyProvider, SigningKey, SigningKeySet,
    StaticKeyProvider,
};
pub use validator::{TokenValidator, ValidatorSettings};

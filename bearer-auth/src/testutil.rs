//! Fixture keys and signed tokens for test suites.
//!
//! Enabled for this crate's own tests and, through the `testutil` feature, for
//! downstream crates. Not meant for production use.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

use crate::jwks::Jwk;

/// Key-id of the fixture RSA key
pub const TEST_RSA_KID: &str = "test-rsa-key";

/// Private half of the fixture RSA key pair (PKCS#1 PEM, 2048 bits)
pub const TEST_RSA_PRIVATE_PEM: &str = include_str!("../fixtures/test_rsa_private.pem");

const TEST_RSA_MODULUS: &str = "jwG201ynmEfIxDvbQ21MVuL6XybNatRCU2xgpOC1L10pwuBONSRVcvEPjzV3QT0efYUYeAWFwQB3MMTot06Jdi6GZl7KUpY1OOlcQef1ONzv09aRyPg-oHEDbcbd2BKklq-KYOJLOl7OulClwa3ndU20iMVZeMa4ZjD1LMzCSoAkqNKDYfLnsbX1ADm1S3j1WjGv_heLL0VWFUQZDbkV9-WAgY--Ey94eacLw1l_UsMVHUhlSPflF8g3QnzzKPQCEwqalmB4-xAZ1u0WZyUSXgMrYvMCJYyQ0txaPy28ycqQpxLr2RrSxDgFNKdcANSs6DX-Y-84HTCxO9h5QtSmvQ";
const TEST_RSA_EXPONENT: &str = "AQAB";

/// PKCS#8 v1 prefix for a raw 32-byte Ed25519 seed
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// Public JWK of the fixture RSA key, published under `kid`
pub fn rsa_jwk(kid: &str) -> Jwk {
    Jwk {
        kty: "RSA".into(),
        kid: Some(kid.into()),
        alg: Some("RS256".into()),
        key_use: Some("sig".into()),
        n: Some(TEST_RSA_MODULUS.into()),
        e: Some(TEST_RSA_EXPONENT.into()),
        crv: None,
        x: None,
        y: None,
    }
}

/// Deterministic Ed25519 key pair derived from `seed`.
///
/// Returns the PKCS#8 DER private key and the base64url public key (`x`).
pub fn ed25519_keypair(seed: u8) -> (Vec<u8>, String) {
    let secret = [seed; 32];
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&secret);
    let public = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let mut pkcs8 = ED25519_PKCS8_PREFIX.to_vec();
    pkcs8.extend_from_slice(&secret);
    (pkcs8, public)
}

pub fn ed25519_jwk(kid: &str, x: &str) -> Jwk {
    Jwk {
        kty: "OKP".into(),
        kid: Some(kid.into()),
        alg: Some("EdDSA".into()),
        key_use: Some("sig".into()),
        n: None,
        e: None,
        crv: Some("Ed25519".into()),
        x: Some(x.into()),
        y: None,
    }
}

/// JWKS document body for the given keys
pub fn jwks_json(keys: &[Jwk]) -> Value {
    json!({ "keys": keys })
}

/// Builder for signed test tokens.
///
/// Defaults: the fixture RSA key-id, subject `auth0|test-user`, issued now,
/// expiring in an hour, no permissions.
#[derive(Debug, Clone)]
pub struct TestToken {
    kid: Option<String>,
    claims: Map<String, Value>,
}

impl TestToken {
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("iss".into(), json!(issuer));
        claims.insert("sub".into(), json!("auth0|test-user"));
        claims.insert("aud".into(), json!(audience));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + 3600));
        Self {
            kid: Some(TEST_RSA_KID.into()),
            claims,
        }
    }

    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    pub fn permissions(self, permissions: &[&str]) -> Self {
        self.claim("permissions", json!(permissions))
    }

    /// Set `exp` relative to now; negative values produce an expired token
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = Utc::now().timestamp() + seconds;
        self.claim("exp", json!(exp))
    }

    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.into(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn sign_with(&self, alg: Algorithm, key: &EncodingKey) -> String {
        let mut header = Header::new(alg);
        header.kid = self.kid.clone();
        jsonwebtoken::encode(&header, &self.claims, key).expect("Failed to sign test token")
    }

    /// Sign with the fixture RSA key
    pub fn sign_rs256(&self) -> String {
        let key = EncodingKey::from_rsa_pem(TEST_RSA_PRIVATE_PEM.as_bytes())
            .expect("Fixture RSA key must parse");
        self.sign_with(Algorithm::RS256, &key)
    }

    /// Sign with a PKCS#8 Ed25519 key from [`ed25519_keypair`]
    pub fn sign_ed25519(&self, pkcs8: &[u8]) -> String {
        self.sign_with(Algorithm::EdDSA, &EncodingKey::from_ed_der(pkcs8))
    }

    pub fn sign_hs256(&self, secret: &[u8]) -> String {
        self.sign_with(Algorithm::HS256, &EncodingKey::from_secret(secret))
    }
}

/// Assemble a token from arbitrary header and claims with a junk signature.
///
/// Useful for headers the signing library refuses to produce, such as `alg: none`.
pub fn craft_raw_jwt(header: &Value, claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode(b"not-a-signature");
    format!("{header}.{claims}.{signature}")
}

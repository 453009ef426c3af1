use http::StatusCode;
use thiserror::Error;

/// Errors raised while fetching the identity provider's key set
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyFetchError {
    #[error("Failed to build key provider client: {0}")]
    Client(String),
    #[error("Failed to reach key provider: {0}")]
    Request(String),
    #[error("Key provider answered with status: {0}")]
    InvalidStatus(StatusCode),
    #[error("Failed to parse key set: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for KeyFetchError {
    fn from(err: reqwest::Error) -> Self {
        KeyFetchError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for KeyFetchError {
    fn from(err: serde_json::Error) -> Self {
        KeyFetchError::Parse(err.to_string())
    }
}

/// Classification of an authorization failure, independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    MissingToken,
    MalformedHeader,
    MalformedToken,
    InvalidAlgorithm,
    UnknownKey,
    BadSignature,
    ExpiredToken,
    WrongIssuer,
    WrongAudience,
    InsufficientPermission,
    KeyFetch,
}

impl AuthErrorKind {
    /// Stable machine-readable code, used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MalformedHeader => "malformed_header",
            Self::MalformedToken => "malformed_token",
            Self::InvalidAlgorithm => "invalid_algorithm",
            Self::UnknownKey => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::ExpiredToken => "token_expired",
            Self::WrongIssuer => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
            Self::InsufficientPermission => "insufficient_permission",
            Self::KeyFetch => "key_fetch_failed",
        }
    }

    /// HTTP status for this failure: 403 for a missing permission, 401 for everything else
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientPermission => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Authentication and authorization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization token is missing")]
    MissingToken,

    #[error("Malformed authorization header: {0}")]
    MalformedHeader(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("Unknown signing key: {kid}")]
    UnknownKey { kid: String },

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Incorrect issuer: {0}")]
    WrongIssuer(String),

    #[error("Incorrect audience: {0}")]
    WrongAudience(String),

    #[error("{0}")]
    InsufficientPermission(String),

    #[error("Unable to fetch signing keys: {0}")]
    KeyFetch(#[from] KeyFetchError),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MissingToken => AuthErrorKind::MissingToken,
            Self::MalformedHeader(_) => AuthErrorKind::MalformedHeader,
            Self::MalformedToken(_) => AuthErrorKind::MalformedToken,
            Self::InvalidAlgorithm(_) => AuthErrorKind::InvalidAlgorithm,
            Self::UnknownKey { .. } => AuthErrorKind::UnknownKey,
            Self::BadSignature => AuthErrorKind::BadSignature,
            Self::ExpiredToken => AuthErrorKind::ExpiredToken,
            Self::WrongIssuer(_) => AuthErrorKind::WrongIssuer,
            Self::WrongAudience(_) => AuthErrorKind::WrongAudience,
            Self::InsufficientPermission(_) => AuthErrorKind::InsufficientPermission,
            Self::KeyFetch(_) => AuthErrorKind::KeyFetch,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    pub(crate) fn malformed_header(message: impl Into<String>) -> Self {
        Self::MalformedHeader(message.into())
    }

    pub(crate) fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken(message.into())
    }

    pub(crate) fn invalid_algorithm(message: impl Into<String>) -> Self {
        Self::InvalidAlgorithm(message.into())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                AuthError::BadSignature
            }
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            ErrorKind::InvalidIssuer => AuthError::WrongIssuer("issuer validation failed".into()),
            ErrorKind::InvalidAudience => {
                AuthError::WrongAudience("audience validation failed".into())
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
                AuthError::WrongIssuer("token has no issuer".into())
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                AuthError::WrongAudience("token has no audience".into())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::malformed_token(format!("missing required claim '{claim}'"))
            }
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                AuthError::invalid_algorithm("algorithm does not match the signing key")
            }
            _ => AuthError::malformed_token(format!("unable to decode token: {err}")),
        }
    }
}

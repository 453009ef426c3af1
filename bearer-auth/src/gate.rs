use crate::claims::DecodedClaims;
use crate::error::{AuthError, AuthErrorKind};

/// Outcome of checking a validated token against a required permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized(DecodedClaims),
    Denied(AuthErrorKind, String),
}

impl AuthDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    /// Claims on success; a denial becomes the matching [`AuthError`]
    pub fn into_result(self) -> Result<DecodedClaims, AuthError> {
        let (kind, message) = match self {
            Self::Authorized(claims) => return Ok(claims),
            Self::Denied(kind, message) => (kind, message),
        };

        Err(match kind {
            AuthErrorKind::InsufficientPermission => AuthError::InsufficientPermission(message),
            AuthErrorKind::MissingToken => AuthError::MissingToken,
            AuthErrorKind::MalformedHeader => AuthError::MalformedHeader(message),
            AuthErrorKind::InvalidAlgorithm => AuthError::InvalidAlgorithm(message),
            AuthErrorKind::UnknownKey => AuthError::UnknownKey { kid: message },
            AuthErrorKind::BadSignature => AuthError::BadSignature,
            AuthErrorKind::ExpiredToken => AuthError::ExpiredToken,
            AuthErrorKind::WrongIssuer => AuthError::WrongIssuer(message),
            AuthErrorKind::WrongAudience => AuthError::WrongAudience(message),
            AuthErrorKind::MalformedToken | AuthErrorKind::KeyFetch => {
                AuthError::MalformedToken(message)
            }
        })
    }
}

impl From<AuthError> for AuthDecision {
    fn from(err: AuthError) -> Self {
        let message = match &err {
            AuthError::UnknownKey { kid } => kid.clone(),
            other => other.to_string(),
        };
        Self::Denied(err.kind(), message)
    }
}

/// Decide whether `claims` grant `required`.
///
/// Exact string membership only. An absent `permissions` claim grants nothing.
pub fn check(claims: DecodedClaims, required: &str) -> AuthDecision {
    if claims.has_permission(required) {
        AuthDecision::Authorized(claims)
    } else {
        AuthDecision::Denied(
            AuthErrorKind::InsufficientPermission,
            format!("Permission '{required}' not granted"),
        )
    }
}

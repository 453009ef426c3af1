use http::header::AUTHORIZATION;
use http::HeaderMap;

use crate::error::AuthError;

const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization` header value of the form `Bearer <token>`.
///
/// The scheme is matched case-insensitively. Exactly one space must separate it
/// from a non-empty token.
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 {
        return Err(AuthError::malformed_header(
            "Authorization header must be in the format 'Bearer <token>'",
        ));
    }

    if !parts[0].eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::malformed_header(
            "Authorization header must start with 'Bearer'",
        ));
    }

    let token = parts[1];
    if token.is_empty() {
        return Err(AuthError::malformed_header("Token not found"));
    }

    Ok(token)
}

/// Read and parse the bearer token from request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::malformed_header("Authorization header is expected"))?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::malformed_header("Authorization header is not valid ASCII"))?;

    parse_bearer(value)
}

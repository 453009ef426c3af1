use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use bearer_auth::{bearer_token, gate, AuthError, DecodedClaims, TokenValidator};
use http::HeaderMap;
use log::{debug, warn};
use std::sync::Arc;

pub(crate) const GET_DRINKS_DETAIL: &str = "get:drinks-detail";
pub(crate) const POST_DRINKS: &str = "post:drinks";
pub(crate) const PATCH_DRINKS: &str = "patch:drinks";
pub(crate) const DELETE_DRINKS: &str = "delete:drinks";

/// Middleware state: the shared validator plus the permission one route requires
#[derive(Clone)]
pub(crate) struct PermissionGuard {
    validator: Arc<TokenValidator>,
    required: &'static str,
}

/// Require `required` for every method in `route`.
///
/// Applied with `route_layer`, so unmatched paths still answer 404 instead of 401.
pub(crate) fn with_permission(
    state: &AppState,
    required: &'static str,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    let guard = PermissionGuard {
        validator: state.validator.clone(),
        required,
    };
    route.route_layer(middleware::from_fn_with_state(guard, require_permission))
}

/// Validates the bearer token and checks the route's permission before running
/// the handler; on success the decoded claims are available as an `Extension`.
pub(crate) async fn require_permission(
    State(guard): State<PermissionGuard>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = match authorize(&guard, request.headers()).await {
        Ok(claims) => claims,
        Err((err, subject)) => {
            // Never log the token itself
            warn!(
                "Denied {} {} (requires '{}') to subject {}: {}",
                request.method(),
                request.uri().path(),
                guard.required,
                subject.as_deref().unwrap_or("-"),
                err.kind().as_str()
            );
            return ApiError::from(err).into_response();
        }
    };

    debug!(
        "Granted '{}' to subject {} for {} {}",
        guard.required,
        claims.subject(),
        request.method(),
        request.uri().path()
    );
    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Run header parsing, validation and the permission gate; on failure also
/// return the subject when the token got far enough to reveal one
async fn authorize(
    guard: &PermissionGuard,
    headers: &HeaderMap,
) -> Result<DecodedClaims, (AuthError, Option<String>)> {
    let token = bearer_token(headers).map_err(|e| (e, None))?;
    let claims = guard.validator.validate(token).await.map_err(|e| (e, None))?;

    let subject = claims.sub.clone();
    gate::check(claims, guard.required)
        .into_result()
        .map_err(|e| (e, subject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::routing::get;
    use axum::{Extension, Router};
    use bearer_auth::testutil::{jwks_json, rsa_jwk, TestToken, TEST_RSA_KID};
    use http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_ROUTE: &str = "/test";

    async fn whoami(Extension(claims): Extension<DecodedClaims>) -> String {
        claims.subject().to_string()
    }

    /// Helper function to set up a mock app guarded by `post:drinks`
    async fn setup_guarded_app(jwks_mock: &MockServer) -> Router {
        let config = AppConfig::for_test_with_mocks(jwks_mock);
        let state = AppState::for_testing(&config).await;

        Router::new()
            .route(TEST_ROUTE, with_permission(&state, POST_DRINKS, get(whoami)))
            .with_state(state)
    }

    async fn mount_jwks(jwks_mock: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[rsa_jwk(TEST_RSA_KID)])))
            .mount(jwks_mock)
            .await;
    }

    fn token() -> TestToken {
        TestToken::new("https://drinks-test.example.com/", "drinks")
    }

    /// Helper function to build a request with optional authorization header
    async fn send_request(app: &Router, auth_header: Option<&str>) -> (StatusCode, String) {
        let mut request_builder = Request::builder().uri(TEST_ROUTE);

        if let Some(auth) = auth_header {
            request_builder = request_builder.header("Authorization", auth);
        }

        let request = request_builder
            .body(Body::empty())
            .expect("Failed to build request");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let body = String::from_utf8(body_bytes.to_vec())
            .expect("Failed to convert response body to string");

        (status, body)
    }

    fn message(body: &str) -> String {
        let json: Value = serde_json::from_str(body).expect("Error body must be JSON");
        assert_eq!(json["success"], false);
        json["message"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_authorized_request_reaches_handler() {
        let jwks_mock = MockServer::start().await;
        mount_jwks(&jwks_mock).await;
        let app = setup_guarded_app(&jwks_mock).await;

        let jwt = token().permissions(&["post:drinks"]).sign_rs256();
        let (status, body) = send_request(&app, Some(&format!("Bearer {jwt}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "auth0|test-user");
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let jwks_mock = MockServer::start().await;
        let app = setup_guarded_app(&jwks_mock).await;
        let (status, body) = send_request(&app, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            message(&body),
            "Malformed authorization header: Authorization header is expected"
        );
    }

    #[tokio::test]
    async fn test_invalid_authorization_format() {
        let jwks_mock = MockServer::start().await;
        let app = setup_guarded_app(&jwks_mock).await;

        for header in ["Basic abc", "Bearer", "Bearer a b", "token"] {
            let (status, body) = send_request(&app, Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {header}");
            assert!(message(&body).starts_with("Malformed authorization header"));
        }
    }

    #[tokio::test]
    async fn test_missing_permission_is_forbidden() {
        let jwks_mock = MockServer::start().await;
        mount_jwks(&jwks_mock).await;
        let app = setup_guarded_app(&jwks_mock).await;

        let jwt = token().permissions(&["get:drinks-detail"]).sign_rs256();
        let (status, body) = send_request(&app, Some(&format!("Bearer {jwt}"))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message(&body), "Permission 'post:drinks' not granted");
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthorized() {
        let jwks_mock = MockServer::start().await;
        mount_jwks(&jwks_mock).await;
        let app = setup_guarded_app(&jwks_mock).await;

        let jwt = token().permissions(&["post:drinks"]).expires_in(-60).sign_rs256();
        let (status, body) = send_request(&app, Some(&format!("Bearer {jwt}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message(&body), "Token expired");
    }

    #[tokio::test]
    async fn test_unknown_key_is_unauthorized() {
        let jwks_mock = MockServer::start().await;
        mount_jwks(&jwks_mock).await;
        let app = setup_guarded_app(&jwks_mock).await;

        let jwt = token().kid("someone-else").permissions(&["post:drinks"]).sign_rs256();
        let (status, body) = send_request(&app, Some(&format!("Bearer {jwt}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message(&body), "Unknown signing key: someone-else");
    }

    #[tokio::test]
    async fn test_key_provider_outage_is_unauthorized() {
        let jwks_mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&jwks_mock)
            .await;
        let app = setup_guarded_app(&jwks_mock).await;

        let jwt = token().permissions(&["post:drinks"]).sign_rs256();
        let (status, body) = send_request(&app, Some(&format!("Bearer {jwt}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message(&body), "Unable to verify token");
    }
}

use crate::config::AppConfig;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use bearer_auth::testutil::{jwks_json, rsa_jwk, TestToken, TEST_RSA_KID};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

/// Test fixture for setting up a complete test environment with a mocked identity provider.
///
/// The JWKS mock publishes the fixture RSA key, the store is a fresh in-memory
/// SQLite database, and [`TestFixture::token`] signs tokens the app accepts.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let manager = fixture.token(&["post:drinks"]);
///
///     let response = fixture.post("/drinks", &new_drink, Some(&manager)).await;
///
///     response.assert_ok();
///     let result = response.json_as::<DrinksResponse>();
///     assert!(result.success);
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub config: AppConfig,
    /// Shared state behind the router, for reaching the store directly
    pub state: AppState,
    /// Mock server for the identity provider's key set
    pub jwks_mock: MockServer,
}

impl TestFixture {
    /// Creates a new test fixture with a JWKS mock and an empty store.
    pub async fn new() -> Self {
        // Initialize test logger
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let jwks_mock = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_json(&[rsa_jwk(TEST_RSA_KID)])),
            )
            .mount(&jwks_mock)
            .await;

        let config = AppConfig::for_test_with_mocks(&jwks_mock);

        let state = AppState::for_testing(&config).await;
        let app = create_app(state.clone()).await;

        Self {
            app,
            config,
            state,
            jwks_mock,
        }
    }

    /// Signs a valid RS256 token for this app's issuer and audience.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let barista = fixture.token(&["get:drinks-detail"]);
    /// let response = fixture.get("/drinks-detail", Some(&barista)).await;
    /// ```
    pub fn token(&self, permissions: &[&str]) -> String {
        self.token_builder().permissions(permissions).sign_rs256()
    }

    /// Token builder preset with this app's issuer and audience, for custom claims
    pub fn token_builder(&self) -> TestToken {
        TestToken::new(&self.config.auth.issuer_url(), &self.config.auth.audience)
    }

    /// Creates a request builder with a JSON content type and an optional bearer token.
    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());

        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.header("Content-Type", "application/json")
    }

    pub async fn get(&self, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    pub async fn post<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        token: Option<&str>,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        self.send_body(Method::POST, uri, json_body, token).await
    }

    /// Sends a POST request with a body that is sent as-is, valid JSON or not.
    pub async fn post_raw(
        &self,
        uri: impl AsRef<str>,
        body: &str,
        token: Option<&str>,
    ) -> TestResponse {
        self.send_body(Method::POST, uri, body.as_bytes().to_vec(), token)
            .await
    }

    pub async fn patch<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        token: Option<&str>,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        self.send_body(Method::PATCH, uri, json_body, token).await
    }

    pub async fn patch_raw(
        &self,
        uri: impl AsRef<str>,
        body: &str,
        token: Option<&str>,
    ) -> TestResponse {
        self.send_body(Method::PATCH, uri, body.as_bytes().to_vec(), token)
            .await
    }

    pub async fn delete(&self, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(Method::DELETE, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    async fn send_body(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> TestResponse {
        let request = self
            .request_builder(method, uri, token)
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    ///
    /// Lower-level than `get()`/`post()`; use it when you need full control
    /// over the request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse { status, json }
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}

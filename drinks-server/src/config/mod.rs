pub(crate) use crate::config::auth::AuthConfig;
pub(crate) use crate::config::database::DatabaseConfig;
use confique::Config;

pub mod auth;
pub mod database;

/// Optional configuration file, read from the working directory
const CONFIG_FILE: &str = "drinks.toml";

/// Main configuration structure for the drinks server
#[derive(Debug, Config, Clone)]
pub struct AppConfig {
    /// The port the server will listen to (default: 5000)
    #[config(env = "DRINKS_PORT", default = 5000)]
    pub port: u16,

    /// Identity provider and token validation settings
    #[config(nested)]
    pub auth: AuthConfig,

    /// Relational store settings
    #[config(nested)]
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from `DRINKS_*` environment variables, falling back to `drinks.toml`
    pub fn new() -> Result<Self, String> {
        let config = Self::builder()
            .env()
            .file(CONFIG_FILE)
            .load()
            .map_err(|e| e.to_string())?;
        config.auth.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(jwks_mock: &wiremock::MockServer) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            auth: AuthConfig {
                domain: "drinks-test.example.com".to_string(),
                audience: "drinks".to_string(),
                issuer: None,
                jwks_url: Some(format!("{}/.well-known/jwks.json", jwks_mock.uri())),
                algorithms: "RS256,EdDSA".to_string(),
                jwks_cache_ttl: 3600,
                jwks_refresh_interval: 60,
                jwks_timeout: 5,
                leeway: 0,
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                // In-memory SQLite is per connection
                max_connections: 1,
                reset_on_startup: true,
            },
        }
    }
}

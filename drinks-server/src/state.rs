use crate::config::AppConfig;
use crate::store::{DrinkStore, StoreError};
use bearer_auth::{JwksClient, KeyFetchError, TokenValidator};
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

/// Failures while assembling the application state
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to create key provider client: {0}")]
    KeyProvider(#[from] KeyFetchError),
    #[error("Failed to initialize store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub validator: Arc<TokenValidator>,
    pub store: Arc<DrinkStore>,
}

impl AppState {
    fn create_validator(config: &AppConfig) -> Result<TokenValidator, StartupError> {
        let settings = config
            .auth
            .validator_settings()
            .map_err(StartupError::Config)?;
        // Keys are fetched lazily on the first authenticated request
        let client = JwksClient::new(config.auth.jwks_endpoint(), config.auth.jwks_options())?;
        info!(
            "Validating tokens from {} for audience '{}' with keys from {}",
            settings.issuer,
            settings.audience,
            client.url()
        );
        Ok(TokenValidator::new(Arc::new(client), settings))
    }

    pub async fn new(config: AppConfig) -> Result<Self, StartupError> {
        let validator = Self::create_validator(&config)?;

        let store = DrinkStore::connect(&config.database).await?;
        store.setup_schema(config.database.reset_on_startup).await?;

        Ok(Self {
            config: Arc::new(config),
            validator: Arc::new(validator),
            store: Arc::new(store),
        })
    }

    #[cfg(test)]
    pub async fn for_testing(config: &AppConfig) -> Self {
        Self::new(config.clone())
            .await
            .expect("Failed to create test state")
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {e}");
                false
            }
        }
    }

    /// Release the connection pool if this is the last handle to the store
    pub async fn shutdown(self) {
        let Self { store, .. } = self;
        match Arc::try_unwrap(store) {
            Ok(store) => {
                if let Err(e) = store.close().await {
                    warn!("Failed to close database connections: {e}");
                }
            }
            Err(_) => warn!("Store still in use, skipping explicit close"),
        }
    }
}

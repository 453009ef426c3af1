use confique::Config;

/// Configuration for the drinks store
#[derive(Debug, Config, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite::memory:` (default: sqlite://database.db?mode=rwc)
    #[config(env = "DRINKS_DATABASE_URL", default = "sqlite://database.db?mode=rwc")]
    pub url: String,

    /// Connection pool size (default: 10)
    #[config(env = "DRINKS_DATABASE_MAX_CONNECTIONS", default = 10)]
    pub max_connections: u32,

    /// Drop and recreate the drinks table at startup (default: true)
    #[config(env = "DRINKS_DATABASE_RESET_ON_STARTUP", default = true)]
    pub reset_on_startup: bool,
}

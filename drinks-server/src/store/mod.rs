//! Persistence for drinks.
//!
//! Recipes are kept as a JSON text column; conversion to [`Drink`] happens on
//! the way out so handlers never see raw rows. Multi-step writes run inside a
//! single transaction.

pub mod entity;

use std::time::Duration;

use log::{debug, info};
use sea_orm::sea_query::Table;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, ModelTrait, QueryOrder, Schema, Set, SqlErr,
    TransactionTrait,
};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::models::{Drink, Ingredient};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Drink {0} not found")]
    NotFound(i32),
    #[error("A drink titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("Invalid drink: {0}")]
    Invalid(String),
    #[error("Failed to (de)serialize recipe: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl TryFrom<entity::Model> for Drink {
    type Error = StoreError;

    fn try_from(model: entity::Model) -> Result<Self, Self::Error> {
        Ok(Drink {
            id: model.id,
            title: model.title,
            recipe: serde_json::from_str(&model.recipe)?,
        })
    }
}

/// Classify insert/update failures, turning unique violations into `DuplicateTitle`
fn write_error(err: DbErr, title: &str) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::DuplicateTitle(title.to_string()),
        _ => StoreError::Database(err),
    }
}

/// Titles must carry at least one visible character
fn check_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid("title must not be empty".to_string()));
    }
    Ok(())
}

/// Connection-pooled drinks repository
#[derive(Debug, Clone)]
pub struct DrinkStore {
    db: DatabaseConnection,
}

impl DrinkStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(config.url.clone());
        opt.max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);

        let db = Database::connect(opt).await?;
        info!("Database connection established");
        Ok(Self { db })
    }

    /// Create the drinks table, dropping any existing one first when `reset` is set
    pub async fn setup_schema(&self, reset: bool) -> Result<(), StoreError> {
        if reset {
            self.drop_schema().await?;
        }

        let backend = self.db.get_database_backend();
        let create = Schema::new(backend)
            .create_table_from_entity(entity::Entity)
            .if_not_exists()
            .to_owned();
        self.db.execute(backend.build(&create)).await?;
        info!("Drinks table ready");
        Ok(())
    }

    /// Drop the drinks table along with every row in it
    pub async fn drop_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let drop = Table::drop()
            .table(entity::Entity)
            .if_exists()
            .to_owned();
        self.db.execute(backend.build(&drop)).await?;
        info!("Dropped drinks table");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }

    /// All drinks, oldest first
    pub async fn list(&self) -> Result<Vec<Drink>, StoreError> {
        entity::Entity::find()
            .order_by_asc(entity::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Drink::try_from)
            .collect()
    }

    pub async fn get(&self, id: i32) -> Result<Drink, StoreError> {
        entity::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(id))
            .and_then(Drink::try_from)
    }

    pub async fn insert(&self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError> {
        check_title(title)?;

        let model = entity::ActiveModel {
            id: NotSet,
            title: Set(title.to_string()),
            recipe: Set(serde_json::to_string(recipe)?),
        }
        .insert(&self.db)
        .await
        .map_err(|e| write_error(e, title))?;

        debug!("Inserted drink {} '{}'", model.id, model.title);
        Drink::try_from(model)
    }

    /// Apply the given changes to drink `id`; `None` leaves a field untouched
    pub async fn update(
        &self,
        id: i32,
        title: Option<&str>,
        recipe: Option<&[Ingredient]>,
    ) -> Result<Drink, StoreError> {
        let txn = self.db.begin().await?;

        let model = entity::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let mut active: entity::ActiveModel = model.clone().into();
        if let Some(title) = title {
            check_title(title)?;
            active.title = Set(title.to_string());
        }
        if let Some(recipe) = recipe {
            active.recipe = Set(serde_json::to_string(recipe)?);
        }

        let model = if active.is_changed() {
            let attempted = title.unwrap_or(&model.title).to_string();
            active
                .update(&txn)
                .await
                .map_err(|e| write_error(e, &attempted))?
        } else {
            model
        };

        txn.commit().await?;
        debug!("Updated drink {id}");
        Drink::try_from(model)
    }

    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        let model = entity::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        model.delete(&txn).await?;

        txn.commit().await?;
        debug!("Deleted drink {id}");
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(self) -> Result<(), StoreError> {
        self.db.close().await?;
        Ok(())
    }
}

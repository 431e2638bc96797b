use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::assets::repo::PgAssetStore;
use crate::assets::services::{LifecycleEngine, SystemClock};
use crate::auth::password::{Argon2Hasher, CredentialHasher};
use crate::auth::repo::{PgUserStore, UserStore};
use crate::barcodes::BarcodeIssuer;
use crate::config::AppConfig;
use crate::storage::{self, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub engine: Arc<LifecycleEngine>,
    pub users: Arc<dyn UserStore>,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = storage::from_config(&config.storage).await?;
        let engine = Arc::new(LifecycleEngine::new(
            Arc::new(PgAssetStore::new(db.clone())),
            BarcodeIssuer::new(storage.clone()),
            Arc::new(SystemClock),
            &config.lifecycle,
        ));

        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            hasher: Arc::new(Argon2Hasher),
            db,
            config,
            storage,
            engine,
        })
    }
}

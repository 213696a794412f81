use anyhow::{Error, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::{config::Config, error::StorageError};

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        Self::connect_url(&config.database_url, config.database_max_connections).await
    }

    pub async fn connect_url(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations applied");

        Ok(())
    }
}

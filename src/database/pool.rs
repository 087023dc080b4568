//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::journal::JournalRepository;

pub struct DatabasePool {
    pool: PgPool,
    journal: JournalRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!(max_connections, "Connected to PostgreSQL");

        let journal = JournalRepository::new(pool.clone());

        Ok(Self { pool, journal })
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing database schema...");
        self.journal.init_schema().await?;
        info!("Database schema initialized");
        Ok(())
    }

    pub fn journal(&self) -> &JournalRepository {
        &self.journal
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

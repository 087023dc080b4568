//! Journal Repository - write-ahead storage for registry commands
//!
//! One row per committed command, keyed by its sequence number. The command
//! itself is stored as JSONB so the journal stays readable from SQL.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use crate::registry::{Address, JournalEntry, RegistryCommand};

pub struct JournalRepository {
    pool: PgPool,
}

impl JournalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize registry schema and journal table
    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing registry journal schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS registry")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create registry schema: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS registry.journal (
                sequence BIGINT PRIMARY KEY,
                caller VARCHAR(42) NOT NULL,
                command_name VARCHAR(64) NOT NULL,
                command JSONB NOT NULL,
                committed_at TIMESTAMP WITH TIME ZONE NOT NULL,
                previous_digest CHAR(64) NOT NULL,
                digest CHAR(64) NOT NULL UNIQUE
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create journal table: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_journal_caller ON registry.journal(caller)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create journal caller index: {}", e))?;

        info!("Registry journal schema initialized");
        Ok(())
    }

    /// Append one entry. Fails if the sequence number is already taken.
    pub async fn append(&self, entry: &JournalEntry) -> Result<(), String> {
        let command = serde_json::to_value(&entry.command)
            .map_err(|e| format!("Failed to encode command: {}", e))?;

        sqlx::query(r#"
            INSERT INTO registry.journal
                (sequence, caller, command_name, command, committed_at, previous_digest, digest)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(entry.sequence as i64)
        .bind(entry.caller.as_str())
        .bind(entry.command.name())
        .bind(command)
        .bind(entry.committed_at)
        .bind(&entry.previous_digest)
        .bind(&entry.digest)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to append journal entry {}: {}", entry.sequence, e))?;

        debug!(sequence = entry.sequence, command = entry.command.name(), "Journal entry persisted");
        Ok(())
    }

    /// All entries in sequence order
    pub async fn load_all(&self) -> Result<Vec<JournalEntry>, String> {
        self.load_since(0).await
    }

    /// Entries with `sequence >= from`, in sequence order
    pub async fn load_since(&self, from: u64) -> Result<Vec<JournalEntry>, String> {
        let rows = sqlx::query(r#"
            SELECT sequence, caller, command, committed_at, previous_digest, digest
            FROM registry.journal
            WHERE sequence >= $1
            ORDER BY sequence ASC
        "#)
        .bind(from as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load journal from {}: {}", from, e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let sequence: i64 = row.get("sequence");
            let caller: String = row.get("caller");
            let command: serde_json::Value = row.get("command");
            let committed_at: DateTime<Utc> = row.get("committed_at");

            let caller = Address::parse(&caller)
                .map_err(|e| format!("Journal entry {} has invalid caller: {}", sequence, e))?;
            let command: RegistryCommand = serde_json::from_value(command)
                .map_err(|e| format!("Journal entry {} has invalid command: {}", sequence, e))?;

            entries.push(JournalEntry {
                sequence: sequence as u64,
                caller,
                command,
                committed_at,
                previous_digest: row.get("previous_digest"),
                digest: row.get("digest"),
            });
        }

        Ok(entries)
    }

    pub async fn count(&self) -> Result<u64, String> {
        let row = sqlx::query("SELECT COUNT(*) AS entries FROM registry.journal")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count journal entries: {}", e))?;

        let entries: i64 = row.get("entries");
        Ok(entries as u64)
    }
}

//! Relational persistence for Agents, WorkItems, MemoryEntries, and the
//! EventLog (spec §3, §4.1). `SqliteStore` is the sole mutable shared
//! resource in the system (spec §5); all mutation flows through it.

pub mod migrations;
pub mod sqlite;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentFilter;
use crate::domain::task::TaskFilter;
use crate::domain::{Agent, EventLogEntry, MemoryEntry, TaskStatus, WorkItem};
use crate::error::CoordinationResult;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

pub fn ensure_database_directory(db_path: &Path) -> Result<(), ConnectionError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Opens the on-disk SQLite database with WAL journaling, matching
/// `examples/odgrim-abathur-swarm/src/infrastructure/database/connection.rs::create_pool`.
pub async fn create_pool(db_path: &Path, config: PoolConfig) -> Result<SqlitePool, ConnectionError> {
    ensure_database_directory(db_path)?;
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// In-memory pool for tests, using a shared cache so every connection in
/// the pool sees the same database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::new()
        .filename("file::memory:")
        .shared_cache(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    Ok(pool)
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn insert(&self, agent: &Agent) -> CoordinationResult<()>;
    async fn get(&self, id: Uuid) -> CoordinationResult<Option<Agent>>;
    async fn update(&self, agent: &Agent) -> CoordinationResult<()>;
    async fn list(&self, filter: &AgentFilter) -> CoordinationResult<Vec<Agent>>;
    /// Guarded terminal transition: only writes (and returns `true`) if the
    /// row is still in a killable status at the moment of the `UPDATE`, so
    /// two concurrent callers can never both win the same kill (spec §9
    /// Design Note: complete the write before publishing any bus event).
    async fn kill_if_active(&self, id: Uuid, stopped_at: chrono::DateTime<chrono::Utc>) -> CoordinationResult<bool>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, item: &WorkItem) -> CoordinationResult<()>;
    async fn get(&self, id: Uuid) -> CoordinationResult<Option<WorkItem>>;
    async fn update(&self, item: &WorkItem) -> CoordinationResult<()>;
    async fn list(&self, filter: &TaskFilter) -> CoordinationResult<Vec<WorkItem>>;
    /// Atomic claim-next per spec §4.1: Priority DESC, CreatedAt ASC,
    /// with a final `Id` tie-break (spec §4.6).
    async fn claim_next(
        &self,
        agent_id: Uuid,
        agent_persona_normalized: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoordinationResult<Option<WorkItem>>;
    /// Guarded terminal transition: only writes (and returns `true`) if the
    /// row is still `InProgress` for this exact agent at the moment of the
    /// `UPDATE`, so two racing completion reports (or a completion racing a
    /// kill) can never both win (spec §9 Design Note).
    async fn complete_if_in_progress(
        &self,
        id: Uuid,
        agent_id: Uuid,
        status: TaskStatus,
        completed_at: chrono::DateTime<chrono::Utc>,
        result: Option<String>,
    ) -> CoordinationResult<bool>;
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Upserts on `(namespace, key)`. Returns `true` if an existing row was
    /// updated, `false` if a new row was inserted (spec §4.7's
    /// MemorySaved/MemoryUpdated distinction).
    async fn upsert(&self, entry: &MemoryEntry) -> CoordinationResult<bool>;
    async fn get(&self, namespace: &str, key: &str) -> CoordinationResult<Option<MemoryEntry>>;
    async fn mark_accessed(&self, id: Uuid, now: chrono::DateTime<chrono::Utc>) -> CoordinationResult<()>;
    async fn list(&self, namespace: Option<&str>) -> CoordinationResult<Vec<MemoryEntry>>;
}

#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn append(&self, entry: &EventLogEntry) -> CoordinationResult<()>;
}

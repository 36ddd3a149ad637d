//! Embedded migration runner. Deliberately not `sqlx::migrate!`, which
//! needs a `DATABASE_URL` available at compile time; this mirrors
//! `examples/odgrim-abathur-swarm/src/adapters/sqlite/migrations.rs`'s
//! hand-rolled `Migration`/`Migrator` pattern instead.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error while migrating: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create agents table",
        sql: r#"
            CREATE TABLE agents (
                id TEXT PRIMARY KEY,
                persona_id TEXT NOT NULL,
                persona_id_normalized TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                working_directory TEXT NOT NULL,
                status TEXT NOT NULL,
                process_id INTEGER,
                model TEXT,
                worktree_name TEXT,
                registered_at TEXT NOT NULL,
                last_heartbeat TEXT NOT NULL,
                started_at TEXT NOT NULL,
                stopped_at TEXT
            );
            CREATE INDEX idx_agents_persona_normalized ON agents(persona_id_normalized);
            CREATE INDEX idx_agents_status ON agents(status);
        "#,
    },
    Migration {
        version: 2,
        description: "create work_items table",
        sql: r#"
            CREATE TABLE work_items (
                id TEXT PRIMARY KEY,
                agent_id TEXT,
                status TEXT NOT NULL,
                persona_id TEXT,
                persona_id_normalized TEXT,
                description TEXT NOT NULL,
                priority INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                result TEXT,
                FOREIGN KEY(agent_id) REFERENCES agents(id)
            );
            CREATE INDEX idx_work_items_claim ON work_items(status, priority, created_at);
            CREATE INDEX idx_work_items_persona_normalized ON work_items(persona_id_normalized);
        "#,
    },
    Migration {
        version: 3,
        description: "create memory_entries table",
        sql: r#"
            CREATE TABLE memory_entries (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                value_type TEXT NOT NULL,
                metadata TEXT,
                is_compressed INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_updated_at TEXT NOT NULL,
                accessed_at TEXT,
                access_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(namespace, key)
            );
        "#,
    },
    Migration {
        version: 4,
        description: "create event_log table",
        sql: r#"
            CREATE TABLE event_log (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                actor TEXT,
                correlation_id TEXT,
                entity_id TEXT,
                entity_type TEXT,
                severity TEXT NOT NULL,
                payload TEXT NOT NULL,
                tags TEXT
            );
            CREATE INDEX idx_event_log_timestamp ON event_log(timestamp);
        "#,
    },
];

pub struct Migrator<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run(&self) -> Result<(), MigrationError> {
        self.ensure_migrations_table().await?;
        let current = self.current_version().await?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            self.apply(migration).await?;
        }
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(self.pool)
        .await?;
        Ok(())
    }

    async fn current_version(&self) -> Result<i64, MigrationError> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(self.pool)
            .await?;
        Ok(row.0.unwrap_or(0))
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        info!(version = migration.version, description = migration.description, "applying migration");
        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

//! SQLite implementation of the repository ports. Uses dynamic
//! `sqlx::query`/`sqlx::query_as` rather than the `sqlx::query!` macro,
//! which requires a live database (or offline cache) at compile time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::agent::AgentFilter;
use crate::domain::task::TaskFilter;
use crate::domain::{Agent, AgentStatus, EventLogEntry, EventSeverity, MemoryEntry, TaskPriority, TaskStatus, WorkItem};
use crate::error::{CoordinationError, CoordinationResult};

use super::{AgentRepository, EventLogRepository, MemoryRepository, TaskRepository};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn agent_status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Starting => "Starting",
        AgentStatus::Running => "Running",
        AgentStatus::Stopping => "Stopping",
        AgentStatus::Stopped => "Stopped",
        AgentStatus::Failed => "Failed",
        AgentStatus::Killed => "Killed",
        AgentStatus::Unhealthy => "Unhealthy",
    }
}

fn parse_agent_status(raw: &str) -> CoordinationResult<AgentStatus> {
    Ok(match raw {
        "Starting" => AgentStatus::Starting,
        "Running" => AgentStatus::Running,
        "Stopping" => AgentStatus::Stopping,
        "Stopped" => AgentStatus::Stopped,
        "Failed" => AgentStatus::Failed,
        "Killed" => AgentStatus::Killed,
        "Unhealthy" => AgentStatus::Unhealthy,
        other => return Err(CoordinationError::internal(format!("unknown agent status in store: {other}"))),
    })
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Pending",
        TaskStatus::InProgress => "InProgress",
        TaskStatus::Completed => "Completed",
        TaskStatus::Failed => "Failed",
    }
}

fn parse_task_status(raw: &str) -> CoordinationResult<TaskStatus> {
    Ok(match raw {
        "Pending" => TaskStatus::Pending,
        "InProgress" => TaskStatus::InProgress,
        "Completed" => TaskStatus::Completed,
        "Failed" => TaskStatus::Failed,
        other => return Err(CoordinationError::internal(format!("unknown task status in store: {other}"))),
    })
}

fn priority_value(priority: TaskPriority) -> i64 {
    priority as i64
}

fn parse_priority(value: i64) -> CoordinationResult<TaskPriority> {
    Ok(match value {
        1 => TaskPriority::Low,
        2 => TaskPriority::Normal,
        3 => TaskPriority::High,
        4 => TaskPriority::Critical,
        other => return Err(CoordinationError::internal(format!("unknown priority in store: {other}"))),
    })
}

fn severity_str(severity: EventSeverity) -> &'static str {
    match severity {
        EventSeverity::Information => "Information",
        EventSeverity::Warning => "Warning",
        EventSeverity::Error => "Error",
        EventSeverity::Critical => "Critical",
    }
}

fn parse_uuid(raw: &str) -> CoordinationResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| CoordinationError::internal(format!("corrupt id in store: {e}")))
}

fn parse_timestamp(raw: &str) -> CoordinationResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoordinationError::internal(format!("corrupt timestamp in store: {e}")))
}

fn agent_from_row(row: &sqlx::sqlite::SqliteRow) -> CoordinationResult<Agent> {
    Ok(Agent {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
        persona_id: row.try_get("persona_id")?,
        persona_id_normalized: row.try_get("persona_id_normalized")?,
        agent_type: row.try_get("agent_type")?,
        working_directory: row.try_get("working_directory")?,
        status: parse_agent_status(row.try_get::<String, _>("status")?.as_str())?,
        process_id: row.try_get::<Option<i64>, _>("process_id")?.map(|v| v as u32),
        model: row.try_get("model")?,
        worktree_name: row.try_get("worktree_name")?,
        registered_at: parse_timestamp(row.try_get::<String, _>("registered_at")?.as_str())?,
        last_heartbeat: parse_timestamp(row.try_get::<String, _>("last_heartbeat")?.as_str())?,
        started_at: parse_timestamp(row.try_get::<String, _>("started_at")?.as_str())?,
        stopped_at: row
            .try_get::<Option<String>, _>("stopped_at")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> CoordinationResult<WorkItem> {
    Ok(WorkItem {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
        agent_id: row
            .try_get::<Option<String>, _>("agent_id")?
            .map(|s| parse_uuid(&s))
            .transpose()?,
        status: parse_task_status(row.try_get::<String, _>("status")?.as_str())?,
        persona_id: row.try_get("persona_id")?,
        persona_id_normalized: row.try_get("persona_id_normalized")?,
        description: row.try_get("description")?,
        priority: parse_priority(row.try_get::<i64, _>("priority")?)?,
        created_at: parse_timestamp(row.try_get::<String, _>("created_at")?.as_str())?,
        started_at: row
            .try_get::<Option<String>, _>("started_at")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        completed_at: row
            .try_get::<Option<String>, _>("completed_at")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        result: row.try_get("result")?,
    })
}

fn memory_from_row(row: &sqlx::sqlite::SqliteRow) -> CoordinationResult<MemoryEntry> {
    let metadata_raw: Option<String> = row.try_get("metadata")?;
    Ok(MemoryEntry {
        id: parse_uuid(row.try_get::<String, _>("id")?.as_str())?,
        namespace: row.try_get("namespace")?,
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        value_type: row.try_get("value_type")?,
        metadata: metadata_raw.map(|raw| serde_json::from_str(&raw)).transpose()?,
        is_compressed: row.try_get::<i64, _>("is_compressed")? != 0,
        size: row.try_get("size")?,
        created_at: parse_timestamp(row.try_get::<String, _>("created_at")?.as_str())?,
        last_updated_at: parse_timestamp(row.try_get::<String, _>("last_updated_at")?.as_str())?,
        accessed_at: row
            .try_get::<Option<String>, _>("accessed_at")?
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        access_count: row.try_get("access_count")?,
    })
}

#[async_trait]
impl AgentRepository for SqliteStore {
    async fn insert(&self, agent: &Agent) -> CoordinationResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, persona_id, persona_id_normalized, agent_type, working_directory, status, process_id, model, worktree_name, registered_at, last_heartbeat, started_at, stopped_at)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(agent.id.to_string())
        .bind(&agent.persona_id)
        .bind(&agent.persona_id_normalized)
        .bind(&agent.agent_type)
        .bind(&agent.working_directory)
        .bind(agent_status_str(agent.status))
        .bind(agent.process_id.map(|v| v as i64))
        .bind(&agent.model)
        .bind(&agent.worktree_name)
        .bind(agent.registered_at.to_rfc3339())
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.started_at.to_rfc3339())
        .bind(agent.stopped_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoordinationResult<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn update(&self, agent: &Agent) -> CoordinationResult<()> {
        sqlx::query(
            "UPDATE agents SET status=?, process_id=?, last_heartbeat=?, stopped_at=? WHERE id = ?",
        )
        .bind(agent_status_str(agent.status))
        .bind(agent.process_id.map(|v| v as i64))
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.stopped_at.map(|ts| ts.to_rfc3339()))
        .bind(agent.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, filter: &AgentFilter) -> CoordinationResult<Vec<Agent>> {
        let mut sql = String::from("SELECT * FROM agents WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.persona_id.is_some() {
            sql.push_str(" AND persona_id_normalized = ?");
        }
        sql.push_str(" ORDER BY registered_at ASC");
        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(agent_status_str(status));
        }
        if let Some(persona) = &filter.persona_id {
            query = query.bind(persona.to_lowercase());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(agent_from_row).collect()
    }

    async fn kill_if_active(&self, id: Uuid, stopped_at: DateTime<Utc>) -> CoordinationResult<bool> {
        let result = sqlx::query(
            "UPDATE agents SET status = 'Killed', stopped_at = ? \
             WHERE id = ? AND status IN ('Starting', 'Running', 'Stopping', 'Unhealthy')",
        )
        .bind(stopped_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn insert(&self, item: &WorkItem) -> CoordinationResult<()> {
        sqlx::query(
            "INSERT INTO work_items (id, agent_id, status, persona_id, persona_id_normalized, description, priority, created_at, started_at, completed_at, result)
             VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(item.id.to_string())
        .bind(item.agent_id.map(|id| id.to_string()))
        .bind(task_status_str(item.status))
        .bind(&item.persona_id)
        .bind(&item.persona_id_normalized)
        .bind(&item.description)
        .bind(priority_value(item.priority))
        .bind(item.created_at.to_rfc3339())
        .bind(item.started_at.map(|ts| ts.to_rfc3339()))
        .bind(item.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&item.result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoordinationResult<Option<WorkItem>> {
        let row = sqlx::query("SELECT * FROM work_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn update(&self, item: &WorkItem) -> CoordinationResult<()> {
        sqlx::query(
            "UPDATE work_items SET agent_id=?, status=?, started_at=?, completed_at=?, result=? WHERE id = ?",
        )
        .bind(item.agent_id.map(|id| id.to_string()))
        .bind(task_status_str(item.status))
        .bind(item.started_at.map(|ts| ts.to_rfc3339()))
        .bind(item.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&item.result)
        .bind(item.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> CoordinationResult<Vec<WorkItem>> {
        let mut sql = String::from("SELECT * FROM work_items WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY priority DESC, created_at ASC, id ASC");
        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(task_status_str(status));
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn claim_next(
        &self,
        agent_id: Uuid,
        agent_persona_normalized: &str,
        now: DateTime<Utc>,
    ) -> CoordinationResult<Option<WorkItem>> {
        // Transaction-scoped select + guarded update + rows_affected retry,
        // per examples/odgrim-abathur-swarm/src/infrastructure/database/task_repo.rs::claim_next_ready_task.
        loop {
            let mut tx = self.pool.begin().await?;
            let candidate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM work_items
                 WHERE status = 'Pending'
                   AND (agent_id = ?1 OR (agent_id IS NULL AND (persona_id_normalized IS NULL OR persona_id_normalized = ?2)))
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT 1",
            )
            .bind(agent_id.to_string())
            .bind(agent_persona_normalized)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((id,)) = candidate else {
                tx.rollback().await.ok();
                return Ok(None);
            };

            let update_result = sqlx::query(
                "UPDATE work_items SET agent_id = ?, status = 'InProgress', started_at = ? WHERE id = ? AND status = 'Pending'",
            )
            .bind(agent_id.to_string())
            .bind(now.to_rfc3339())
            .bind(&id)
            .execute(&mut *tx)
            .await?;

            if update_result.rows_affected() == 0 {
                // Lost the race to another concurrent claimant; retry.
                tx.rollback().await.ok();
                continue;
            }

            let row = sqlx::query("SELECT * FROM work_items WHERE id = ?")
                .bind(&id)
                .fetch_one(&mut *tx)
                .await?;
            let claimed = task_from_row(&row)?;
            tx.commit().await?;
            return Ok(Some(claimed));
        }
    }

    async fn complete_if_in_progress(
        &self,
        id: Uuid,
        agent_id: Uuid,
        status: TaskStatus,
        completed_at: DateTime<Utc>,
        result: Option<String>,
    ) -> CoordinationResult<bool> {
        let update_result = sqlx::query(
            "UPDATE work_items SET status = ?, completed_at = ?, result = ? \
             WHERE id = ? AND agent_id = ? AND status = 'InProgress'",
        )
        .bind(task_status_str(status))
        .bind(completed_at.to_rfc3339())
        .bind(&result)
        .bind(id.to_string())
        .bind(agent_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(update_result.rows_affected() > 0)
    }
}

#[async_trait]
impl MemoryRepository for SqliteStore {
    async fn upsert(&self, entry: &MemoryEntry) -> CoordinationResult<bool> {
        let existing = sqlx::query("SELECT id FROM memory_entries WHERE namespace = ? AND key = ?")
            .bind(&entry.namespace)
            .bind(&entry.key)
            .fetch_optional(&self.pool)
            .await?;
        let was_update = existing.is_some();

        sqlx::query(
            "INSERT INTO memory_entries (id, namespace, key, value, value_type, metadata, is_compressed, size, created_at, last_updated_at, accessed_at, access_count)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                value_type = excluded.value_type,
                metadata = excluded.metadata,
                size = excluded.size,
                last_updated_at = excluded.last_updated_at",
        )
        .bind(entry.id.to_string())
        .bind(&entry.namespace)
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(&entry.value_type)
        .bind(entry.metadata.as_ref().map(|m| m.to_string()))
        .bind(entry.is_compressed as i64)
        .bind(entry.size)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.last_updated_at.to_rfc3339())
        .bind(entry.accessed_at.map(|ts| ts.to_rfc3339()))
        .bind(entry.access_count)
        .execute(&self.pool)
        .await?;
        Ok(was_update)
    }

    async fn get(&self, namespace: &str, key: &str) -> CoordinationResult<Option<MemoryEntry>> {
        let row = sqlx::query("SELECT * FROM memory_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(memory_from_row).transpose()
    }

    async fn mark_accessed(&self, id: Uuid, now: DateTime<Utc>) -> CoordinationResult<()> {
        sqlx::query("UPDATE memory_entries SET accessed_at = ?, access_count = access_count + 1 WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, namespace: Option<&str>) -> CoordinationResult<Vec<MemoryEntry>> {
        let rows = if let Some(ns) = namespace {
            sqlx::query("SELECT * FROM memory_entries WHERE namespace = ? ORDER BY last_updated_at DESC")
                .bind(ns)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT * FROM memory_entries ORDER BY last_updated_at DESC")
                .fetch_all(&self.pool)
                .await?
        };
        rows.iter().map(memory_from_row).collect()
    }
}

#[async_trait]
impl EventLogRepository for SqliteStore {
    async fn append(&self, entry: &EventLogEntry) -> CoordinationResult<()> {
        sqlx::query(
            "INSERT INTO event_log (id, event_type, timestamp, actor, correlation_id, entity_id, entity_type, severity, payload, tags)
             VALUES (?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.event_type)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.actor)
        .bind(entry.correlation_id.map(|id| id.to_string()))
        .bind(&entry.entity_id)
        .bind(&entry.entity_type)
        .bind(severity_str(entry.severity))
        .bind(entry.payload.to_string())
        .bind(entry.tags.as_ref().map(|t| serde_json::to_string(t).unwrap_or_default()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::migrations::Migrator;
    use crate::store::create_test_pool;

    async fn fresh_store() -> SqliteStore {
        let pool = create_test_pool().await.expect("pool");
        Migrator::new(&pool).run().await.expect("migrate");
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn insert_and_get_agent_round_trips() {
        let store = fresh_store().await;
        let agent = Agent::new("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None, Utc::now());
        AgentRepository::insert(&store, &agent).await.unwrap();
        let fetched = AgentRepository::get(&store, agent.id).await.unwrap().expect("agent present");
        assert_eq!(fetched.persona_id, "reviewer");
        assert_eq!(fetched.status, AgentStatus::Starting);
    }

    #[tokio::test]
    async fn claim_next_respects_priority_and_age_ordering() {
        let store = fresh_store().await;
        let agent = Agent::new("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None, Utc::now());
        AgentRepository::insert(&store, &agent).await.unwrap();

        let low = WorkItem::new(None, Some("reviewer".into()), "low".into(), TaskPriority::Low, Utc::now());
        let high = WorkItem::new(None, Some("reviewer".into()), "high".into(), TaskPriority::High, Utc::now());
        TaskRepository::insert(&store, &low).await.unwrap();
        TaskRepository::insert(&store, &high).await.unwrap();

        let claimed = store
            .claim_next(agent.id, "reviewer", Utc::now())
            .await
            .unwrap()
            .expect("a task should be claimed");
        assert_eq!(claimed.id, high.id);
        assert_eq!(claimed.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn memory_upsert_reports_insert_then_update() {
        let store = fresh_store().await;
        let entry = MemoryEntry::new("ns".into(), "k".into(), "v1".into(), None, None, Utc::now());
        let was_update = store.upsert(&entry).await.unwrap();
        assert!(!was_update);

        let mut updated = entry.clone();
        updated.value = "v2".into();
        updated.recompute_size();
        let was_update = store.upsert(&updated).await.unwrap();
        assert!(was_update);

        let fetched = MemoryRepository::get(&store, "ns", "k").await.unwrap().expect("entry present");
        assert_eq!(fetched.value, "v2");
    }
}

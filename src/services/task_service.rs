//! Create, claim-next (atomic), complete, fail; persona routing —
//! spec §4.6. `get_next` implements the long-poll composition from
//! SPEC_FULL.md's C-expansion: select over (event arrival, poll tick,
//! deadline, cancellation).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::clock::SharedClock;
use crate::domain::task::{requery_task_id, TaskFilter};
use crate::domain::{AgentStatus, TaskPriority, TaskStatus, WorkItem};
use crate::error::{CoordinationError, CoordinationResult};
use crate::notifications::WorkItemNotificationService;
use crate::store::{AgentRepository, TaskRepository};

/// Outcome of a `get_next` long-poll, mirroring the `SuccessWithTask` /
/// `NoTasksAvailable` result shapes from spec §4.6 step 3/5.
#[derive(Debug, Clone)]
pub enum GetNextOutcome {
    Claimed(WorkItem),
    NoTasksAvailable { requery_id: String, message: String },
}

pub struct GetNextConfig {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    agents: Arc<dyn AgentRepository>,
    notifications: WorkItemNotificationService,
    clock: SharedClock,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        notifications: WorkItemNotificationService,
        clock: SharedClock,
    ) -> Self {
        Self {
            tasks,
            agents,
            notifications,
            clock,
        }
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        agent_id: Option<Uuid>,
        persona_id: Option<String>,
        description: String,
        priority: TaskPriority,
    ) -> CoordinationResult<Uuid> {
        if description.trim().is_empty() {
            return Err(CoordinationError::invalid_input("description must not be blank"));
        }
        if let Some(agent_id) = agent_id {
            let agent = self
                .agents
                .get(agent_id)
                .await?
                .ok_or_else(|| CoordinationError::not_found(format!("agent not found: {agent_id}")))?;
            if !agent.status.is_active() {
                return Err(CoordinationError::invalid_state("agent is not running"));
            }
        }

        let item = WorkItem::new(agent_id, persona_id.clone(), description, priority, self.clock.now());
        self.tasks.insert(&item).await?;
        info!(task_id = %item.id, "task created");

        let persona_normalized = persona_id.map(|p| p.to_lowercase());
        self.notifications
            .publish_task_created(item.id, agent_id, persona_normalized, &CancellationToken::new())
            .await?;
        Ok(item.id)
    }

    /// Long-poll claim. Always unsubscribes on every exit path (the
    /// `Subscription`'s `Drop` impl tears the mailbox down when `sub` goes
    /// out of scope, satisfying spec §4.1 step "Subscriptions are always
    /// unsubscribed on exit").
    #[instrument(skip(self, config, cancellation))]
    pub async fn get_next(
        &self,
        agent_id: Uuid,
        config: GetNextConfig,
        cancellation: CancellationToken,
    ) -> CoordinationResult<GetNextOutcome> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found(format!("agent not found: {agent_id}")))?;

        if let Some(task) = self.tasks.claim_next(agent_id, &agent.persona_id_normalized, self.clock.now()).await? {
            self.notifications
                .publish_task_claimed(task.id, agent_id, &cancellation)
                .await?;
            return Ok(GetNextOutcome::Claimed(task));
        }

        let sub = self.notifications.subscribe_for_agent(agent_id, cancellation.clone())?;
        let persona_sub = self
            .notifications
            .subscribe_for_persona(&agent.persona_id, cancellation.clone())
            .ok();

        let deadline = tokio::time::Instant::now() + config.wait_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => break,
                _ = sub.next() => {},
                _ = async { match &persona_sub { Some(s) => { s.next().await; } None => futures::future::pending::<()>().await } } => {},
                _ = tokio::time::sleep(config.poll_interval.min(remaining)) => {},
            }

            if let Some(task) = self.tasks.claim_next(agent_id, &agent.persona_id_normalized, self.clock.now()).await? {
                self.notifications
                    .publish_task_claimed(task.id, agent_id, &cancellation)
                    .await?;
                return Ok(GetNextOutcome::Claimed(task));
            }
        }

        Ok(GetNextOutcome::NoTasksAvailable {
            requery_id: requery_task_id(),
            message: "No tasks available. Please call this tool again to continue polling.".to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn report_completion(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        result: Option<String>,
        success: bool,
    ) -> CoordinationResult<()> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found(format!("task not found: {task_id}")))?;

        if task.status.is_terminal() {
            return Err(CoordinationError::invalid_state(format!(
                "task {task_id} is already terminal"
            )));
        }
        if task.status != TaskStatus::InProgress || task.agent_id != Some(agent_id) {
            return Err(CoordinationError::invalid_state(format!(
                "task {task_id} is not in progress for agent {agent_id}"
            )));
        }

        let new_status = if success { TaskStatus::Completed } else { TaskStatus::Failed };
        let completed_at = self.clock.now();
        let won = self
            .tasks
            .complete_if_in_progress(task_id, agent_id, new_status, completed_at, result)
            .await?;
        if !won {
            // Lost the race to a concurrent completion report or kill: the
            // row was no longer InProgress-for-this-agent by the time the
            // guarded UPDATE ran. Re-fetch to report the real current state.
            let current = self
                .tasks
                .get(task_id)
                .await?
                .ok_or_else(|| CoordinationError::not_found(format!("task not found: {task_id}")))?;
            return Err(CoordinationError::invalid_state(format!(
                "task {task_id} is not in progress for agent {agent_id} (now {:?})",
                current.status
            )));
        }

        if success {
            self.notifications.publish_task_completed(task_id, agent_id, &CancellationToken::new()).await?;
        } else {
            self.notifications.publish_task_failed(task_id, agent_id, &CancellationToken::new()).await?;
        }
        Ok(())
    }

    pub async fn get_status(&self, task_id: Uuid) -> CoordinationResult<Option<WorkItem>> {
        self.tasks.get(task_id).await
    }

    pub async fn get_by_status(&self, status: TaskStatus) -> CoordinationResult<Vec<WorkItem>> {
        self.tasks.list(&TaskFilter { status: Some(status) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::task_bus::TaskBus;
    use crate::bus::FullMode;
    use crate::clock::SystemClock;
    use crate::domain::Agent;
    use crate::store::create_test_pool;
    use crate::store::migrations::Migrator;
    use crate::store::sqlite::SqliteStore;

    async fn harness() -> (TaskService, Arc<SqliteStore>) {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(&pool).run().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let notifications = WorkItemNotificationService::new(TaskBus::new(64, FullMode::Wait));
        let service = TaskService::new(store.clone(), store.clone(), notifications, Arc::new(SystemClock));
        (service, store)
    }

    #[tokio::test]
    async fn happy_dispatch_matches_persona() {
        let (service, store) = harness().await;
        let agent = Agent::new("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None, chrono::Utc::now());
        AgentRepository::insert(store.as_ref(), &agent).await.unwrap();

        service
            .create(None, Some("reviewer".into()), "review PR".into(), TaskPriority::Normal)
            .await
            .unwrap();

        let outcome = service
            .get_next(
                agent.id,
                GetNextConfig {
                    poll_interval: Duration::from_millis(50),
                    wait_timeout: Duration::from_millis(500),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        match outcome {
            GetNextOutcome::Claimed(task) => assert_eq!(task.agent_id, Some(agent.id)),
            GetNextOutcome::NoTasksAvailable { .. } => panic!("expected a claimed task"),
        }
    }

    #[tokio::test]
    async fn timeout_returns_requery_synthetic_id() {
        let (service, store) = harness().await;
        let agent = Agent::new("planner".into(), "claude-cli".into(), "/tmp".into(), None, None, chrono::Utc::now());
        AgentRepository::insert(store.as_ref(), &agent).await.unwrap();

        let outcome = service
            .get_next(
                agent.id,
                GetNextConfig {
                    poll_interval: Duration::from_millis(20),
                    wait_timeout: Duration::from_millis(100),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        match outcome {
            GetNextOutcome::NoTasksAvailable { requery_id, .. } => {
                assert!(requery_id.starts_with("system:requery:"));
            }
            GetNextOutcome::Claimed(_) => panic!("expected no tasks available"),
        }
    }

    #[tokio::test]
    async fn terminal_task_rejects_second_completion_report() {
        let (service, store) = harness().await;
        let agent = Agent::new("planner".into(), "claude-cli".into(), "/tmp".into(), None, None, chrono::Utc::now());
        AgentRepository::insert(store.as_ref(), &agent).await.unwrap();
        let task_id = service
            .create(Some(agent.id), None, "do it".into(), TaskPriority::Normal)
            .await
            .unwrap();
        let outcome = service
            .get_next(
                agent.id,
                GetNextConfig {
                    poll_interval: Duration::from_millis(20),
                    wait_timeout: Duration::from_millis(200),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, GetNextOutcome::Claimed(_)));

        service.report_completion(task_id, agent.id, None, true).await.unwrap();
        let second = service.report_completion(task_id, agent.id, None, true).await;
        assert!(second.is_err());
    }
}

//! Register, heartbeat, kill, query lifecycle, emit events — spec §4.5.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::clock::SharedClock;
use crate::domain::agent::AgentFilter;
use crate::domain::{Agent, AgentStatus};
use crate::error::{CoordinationError, CoordinationResult};
use crate::notifications::AgentNotificationService;
use crate::store::AgentRepository;

pub struct AgentService {
    repository: Arc<dyn AgentRepository>,
    notifications: AgentNotificationService,
    clock: SharedClock,
}

impl AgentService {
    pub fn new(repository: Arc<dyn AgentRepository>, notifications: AgentNotificationService, clock: SharedClock) -> Self {
        Self {
            repository,
            notifications,
            clock,
        }
    }

    #[instrument(skip(self))]
    pub async fn register(
        &self,
        persona_id: String,
        agent_type: String,
        working_directory: String,
        model: Option<String>,
        worktree_name: Option<String>,
    ) -> CoordinationResult<Uuid> {
        if persona_id.trim().is_empty() {
            return Err(CoordinationError::invalid_input("persona_id must not be blank"));
        }
        if agent_type.trim().is_empty() {
            return Err(CoordinationError::invalid_input("agent_type must not be blank"));
        }
        if working_directory.trim().is_empty() {
            return Err(CoordinationError::invalid_input("working_directory must not be blank"));
        }

        let agent = Agent::new(persona_id, agent_type, working_directory, model, worktree_name, self.clock.now());
        self.repository.insert(&agent).await?;
        info!(agent_id = %agent.id, "agent registered");
        self.notifications
            .publish_registered(agent.id, &CancellationToken::new())
            .await?;
        Ok(agent.id)
    }

    #[instrument(skip(self))]
    pub async fn heartbeat(&self, agent_id: Uuid) -> CoordinationResult<bool> {
        let Some(mut agent) = self.repository.get(agent_id).await? else {
            return Ok(false);
        };
        agent.last_heartbeat = self.clock.now();
        let promoted = agent.status == AgentStatus::Starting;
        if promoted {
            agent.status = AgentStatus::Running;
        }
        self.repository.update(&agent).await?;
        if promoted {
            self.notifications
                .publish_status_changed(agent.id, AgentStatus::Running, &CancellationToken::new())
                .await?;
        }
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn kill(&self, agent_id: Uuid) -> CoordinationResult<()> {
        let agent = self
            .repository
            .get(agent_id)
            .await?
            .ok_or_else(|| CoordinationError::not_found(format!("agent not found: {agent_id}")))?;

        if agent.status == AgentStatus::Killed {
            // Terminal on entry: no-op success, per spec §4.5.
            return Ok(());
        }
        if !agent.status.is_killable() {
            return Err(CoordinationError::invalid_state(format!(
                "agent {agent_id} cannot be killed from status {:?}",
                agent.status
            )));
        }

        let won = self.repository.kill_if_active(agent_id, self.clock.now()).await?;
        if !won {
            // Lost the race to a concurrent kill (or the agent transitioned
            // out of a killable status between the read above and the
            // guarded write). Either way the agent is now terminal, so a
            // second kill is a no-op success rather than an error.
            let current = self
                .repository
                .get(agent_id)
                .await?
                .ok_or_else(|| CoordinationError::not_found(format!("agent not found: {agent_id}")))?;
            return if current.status == AgentStatus::Killed {
                Ok(())
            } else {
                Err(CoordinationError::invalid_state(format!(
                    "agent {agent_id} cannot be killed from status {:?}",
                    current.status
                )))
            };
        }
        self.notifications.publish_killed(agent_id, &CancellationToken::new()).await?;
        Ok(())
    }

    pub async fn list(&self, filter: &AgentFilter) -> CoordinationResult<Vec<Agent>> {
        self.repository.list(filter).await
    }

    /// Flips `Running` agents whose heartbeat is stale into `Unhealthy`.
    /// Intended to be driven by a periodic background task (SPEC_FULL.md
    /// supplemented feature).
    #[instrument(skip(self))]
    pub async fn sweep_unhealthy(&self, heartbeat_timeout: Duration) -> CoordinationResult<Vec<Uuid>> {
        let running = self
            .repository
            .list(&AgentFilter {
                status: Some(AgentStatus::Running),
                persona_id: None,
            })
            .await?;
        let now = self.clock.now();
        let mut flipped = Vec::new();
        for mut agent in running {
            let stale = now.signed_duration_since(agent.last_heartbeat);
            if stale.to_std().unwrap_or(Duration::ZERO) > heartbeat_timeout {
                agent.status = AgentStatus::Unhealthy;
                self.repository.update(&agent).await?;
                self.notifications
                    .publish_status_changed(agent.id, AgentStatus::Unhealthy, &CancellationToken::new())
                    .await?;
                flipped.push(agent.id);
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::agent_bus::AgentBus;
    use crate::bus::FullMode;
    use crate::clock::FakeClock;
    use crate::store::create_test_pool;
    use crate::store::migrations::Migrator;
    use crate::store::sqlite::SqliteStore;

    async fn service() -> (AgentService, FakeClock) {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(&pool).run().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let clock = FakeClock::new(chrono::Utc::now());
        let notifications = AgentNotificationService::new(AgentBus::new(16, FullMode::Wait));
        let service = AgentService::new(store, notifications, Arc::new(clock.clone()));
        (service, clock)
    }

    #[tokio::test]
    async fn register_rejects_blank_persona() {
        let (service, _clock) = service().await;
        let result = service
            .register(" ".into(), "claude-cli".into(), "/tmp".into(), None, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn heartbeat_promotes_starting_to_running() {
        let (service, _clock) = service().await;
        let id = service
            .register("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None)
            .await
            .unwrap();
        assert!(service.heartbeat(id).await.unwrap());
        let agent = service
            .list(&AgentFilter::default())
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.id == id)
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Running);
    }

    #[tokio::test]
    async fn heartbeat_on_missing_agent_returns_false() {
        let (service, _clock) = service().await;
        assert!(!service.heartbeat(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn kill_on_already_killed_agent_is_a_noop() {
        let (service, _clock) = service().await;
        let id = service
            .register("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None)
            .await
            .unwrap();
        service.kill(id).await.unwrap();
        service.kill(id).await.expect("second kill should be a no-op success");
    }

    #[tokio::test]
    async fn sweep_flips_stale_running_agents_to_unhealthy() {
        let (service, clock) = service().await;
        let id = service
            .register("reviewer".into(), "claude-cli".into(), "/tmp".into(), None, None)
            .await
            .unwrap();
        service.heartbeat(id).await.unwrap();
        clock.advance(chrono::Duration::seconds(200));
        let flipped = service.sweep_unhealthy(Duration::from_secs(90)).await.unwrap();
        assert_eq!(flipped, vec![id]);
    }
}

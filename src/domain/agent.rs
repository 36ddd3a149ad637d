//! Agent entity — spec §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AgentStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
    Killed,
    Unhealthy,
}

impl AgentStatus {
    /// Terminal states forbid further mutation except read, per spec §3.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::Stopped | AgentStatus::Failed | AgentStatus::Killed
        )
    }

    /// States from which `Kill` is a valid transition, per spec §4.5.
    pub fn is_killable(self) -> bool {
        matches!(
            self,
            AgentStatus::Starting
                | AgentStatus::Running
                | AgentStatus::Stopping
                | AgentStatus::Unhealthy
        )
    }

    /// States in which the agent is an eligible claimant for work, per
    /// spec §4.6's `Create` contract ("must exist and be in an active
    /// state").
    pub fn is_active(self) -> bool {
        matches!(self, AgentStatus::Starting | AgentStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub persona_id: String,
    /// Lower-cased copy of `persona_id`, maintained alongside the original
    /// so persona matching stays case-insensitive without per-query
    /// normalization (spec §9 design note).
    pub persona_id_normalized: String,
    pub agent_type: String,
    pub working_directory: String,
    pub status: AgentStatus,
    pub process_id: Option<u32>,
    pub model: Option<String>,
    pub worktree_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(
        persona_id: String,
        agent_type: String,
        working_directory: String,
        model: Option<String>,
        worktree_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let persona_id_normalized = persona_id.to_lowercase();
        Self {
            id: Uuid::new_v4(),
            persona_id,
            persona_id_normalized,
            agent_type,
            working_directory,
            status: AgentStatus::Starting,
            process_id: None,
            model,
            worktree_name,
            registered_at: now,
            last_heartbeat: now,
            started_at: now,
            stopped_at: None,
        }
    }

    pub fn matches_persona(&self, persona_id: &str) -> bool {
        self.persona_id_normalized == persona_id.to_lowercase()
    }
}

/// Optional filter for `AgentService::list`.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub persona_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_matching_is_case_insensitive() {
        let agent = Agent::new(
            "Reviewer".into(),
            "claude-cli".into(),
            "/tmp/work".into(),
            None,
            None,
            Utc::now(),
        );
        assert!(agent.matches_persona("reviewer"));
        assert!(agent.matches_persona("REVIEWER"));
        assert!(!agent.matches_persona("planner"));
    }

    #[test]
    fn new_agent_starts_in_starting_state() {
        let agent = Agent::new(
            "planner".into(),
            "claude-cli".into(),
            "/tmp/work".into(),
            None,
            None,
            Utc::now(),
        );
        assert_eq!(agent.status, AgentStatus::Starting);
        assert!(agent.status.is_active());
        assert!(!agent.status.is_terminal());
    }
}

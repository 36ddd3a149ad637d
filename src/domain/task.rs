//! WorkItem entity — spec §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub status: TaskStatus,
    pub persona_id: Option<String>,
    pub persona_id_normalized: Option<String>,
    pub description: String,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
}

impl WorkItem {
    pub fn new(
        agent_id: Option<Uuid>,
        persona_id: Option<String>,
        description: String,
        priority: TaskPriority,
        now: DateTime<Utc>,
    ) -> Self {
        let persona_id_normalized = persona_id.as_ref().map(|p| p.to_lowercase());
        Self {
            id: Uuid::new_v4(),
            agent_id,
            status: TaskStatus::Pending,
            persona_id,
            persona_id_normalized,
            description,
            priority,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    /// Eligibility predicate from spec §4.6 step 2: a pending task is a
    /// candidate for `agent_id` if it is already assigned to that agent, or
    /// unassigned and either persona-agnostic or persona-matched.
    pub fn eligible_for(&self, agent_id: Uuid, agent_persona_normalized: &str) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        if self.agent_id == Some(agent_id) {
            return true;
        }
        if self.agent_id.is_some() {
            return false;
        }
        match &self.persona_id_normalized {
            None => true,
            Some(p) => p == agent_persona_normalized,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Synthetic task id returned by `get_next_task` on long-poll timeout, per
/// spec §9 design note — clients depend on this shape verbatim.
pub fn requery_task_id() -> String {
    format!("system:requery:{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(persona: Option<&str>, agent: Option<Uuid>) -> WorkItem {
        WorkItem::new(
            agent,
            persona.map(str::to_string),
            "do the thing".into(),
            TaskPriority::Normal,
            Utc::now(),
        )
    }

    #[test]
    fn unassigned_persona_agnostic_task_is_eligible_for_any_agent() {
        let task = item(None, None);
        assert!(task.eligible_for(Uuid::new_v4(), "reviewer"));
    }

    #[test]
    fn persona_scoped_task_requires_matching_persona() {
        let task = item(Some("reviewer"), None);
        assert!(task.eligible_for(Uuid::new_v4(), "reviewer"));
        assert!(!task.eligible_for(Uuid::new_v4(), "planner"));
    }

    #[test]
    fn task_pinned_to_another_agent_is_not_eligible() {
        let pinned_to = Uuid::new_v4();
        let task = item(None, Some(pinned_to));
        assert!(task.eligible_for(pinned_to, "reviewer"));
        assert!(!task.eligible_for(Uuid::new_v4(), "reviewer"));
    }

    #[test]
    fn requery_id_has_expected_prefix() {
        assert!(requery_task_id().starts_with("system:requery:"));
    }
}

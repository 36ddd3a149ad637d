//! Concrete `EventBus` instantiation for work-item lifecycle events
//! (spec §4.4 `WorkItemNotificationService`).

use uuid::Uuid;

use super::{EventBus, EventEnvelope, EventFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    TaskCreated,
    TaskClaimed,
    TaskCompleted,
    TaskFailed,
}

#[derive(Debug, Clone)]
pub struct TaskEventPayload {
    pub task_id: Uuid,
    /// Agent the event targets, if any. A persona-broadcast event
    /// (`agent_id: None`) is distinct from an agent-pinned event.
    pub agent_id: Option<Uuid>,
    pub persona_id_normalized: Option<String>,
}

pub type TaskBus = EventBus<TaskEventKind, TaskEventPayload>;
pub type TaskEventEnvelope = EventEnvelope<TaskEventKind, TaskEventPayload>;
pub type TaskEventFilter = EventFilter<TaskEventKind, TaskEventPayload>;

/// Routing rule from spec §4.2: an agent-scoped subscriber only receives
/// events addressed to that agent; a persona-scoped subscriber only
/// receives events that are either unaddressed or addressed to its
/// persona, and never events already pinned to a *different* agent.
pub fn for_agent(agent_id: Uuid) -> impl Fn(&TaskEventPayload) -> bool {
    move |payload: &TaskEventPayload| payload.agent_id == Some(agent_id)
}

pub fn for_persona(persona_id_normalized: String) -> impl Fn(&TaskEventPayload) -> bool {
    move |payload: &TaskEventPayload| {
        payload.agent_id.is_none()
            && payload
                .persona_id_normalized
                .as_deref()
                .map(|p| p == persona_id_normalized)
                .unwrap_or(true)
    }
}

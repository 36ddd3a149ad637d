//! Concrete `EventBus` instantiation for agent lifecycle events
//! (spec §4.4 `AgentNotificationService`).

use uuid::Uuid;

use crate::domain::AgentStatus;

use super::{EventBus, EventEnvelope, EventFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentEventKind {
    AgentRegistered,
    AgentKilled,
    AgentStatusChanged,
}

#[derive(Debug, Clone)]
pub struct AgentEventPayload {
    pub agent_id: Uuid,
    pub status: AgentStatus,
}

pub type AgentBus = EventBus<AgentEventKind, AgentEventPayload>;
pub type AgentEventEnvelope = EventEnvelope<AgentEventKind, AgentEventPayload>;
pub type AgentEventFilter = EventFilter<AgentEventKind, AgentEventPayload>;

pub fn for_agent(agent_id: Uuid) -> impl Fn(&AgentEventPayload) -> bool {
    move |payload: &AgentEventPayload| payload.agent_id == agent_id
}

pub fn any() -> impl Fn(&AgentEventPayload) -> bool {
    |_: &AgentEventPayload| true
}

//! Thin façade binding `AgentBus` to the subject filters `AgentService`
//! needs (spec §4.4).

use uuid::Uuid;

use crate::bus::agent_bus::{any, for_agent, AgentBus, AgentEventKind, AgentEventPayload};
use crate::bus::EventFilter;
use crate::cancellation::CancellationToken;
use crate::domain::AgentStatus;
use crate::error::CoordinationResult;

#[derive(Clone)]
pub struct AgentNotificationService {
    bus: AgentBus,
}

impl AgentNotificationService {
    pub fn new(bus: AgentBus) -> Self {
        Self { bus }
    }

    pub fn subscribe_for_agent(
        &self,
        agent_id: Uuid,
        cancellation: CancellationToken,
    ) -> CoordinationResult<crate::bus::Subscription<AgentEventKind, AgentEventPayload>> {
        let filter = EventFilter::new(
            [
                AgentEventKind::AgentRegistered,
                AgentEventKind::AgentKilled,
                AgentEventKind::AgentStatusChanged,
            ],
            for_agent(agent_id),
        );
        self.bus.subscribe(filter, cancellation)
    }

    pub fn subscribe_broadcast(
        &self,
        cancellation: CancellationToken,
    ) -> CoordinationResult<crate::bus::Subscription<AgentEventKind, AgentEventPayload>> {
        let filter = EventFilter::new(
            [
                AgentEventKind::AgentRegistered,
                AgentEventKind::AgentKilled,
                AgentEventKind::AgentStatusChanged,
            ],
            any(),
        );
        self.bus.subscribe(filter, cancellation)
    }

    pub async fn publish_registered(&self, agent_id: Uuid, cancellation: &CancellationToken) -> CoordinationResult<()> {
        self.bus
            .publish(
                AgentEventKind::AgentRegistered,
                AgentEventPayload {
                    agent_id,
                    status: AgentStatus::Starting,
                },
                None,
                cancellation,
            )
            .await
    }

    pub async fn publish_killed(&self, agent_id: Uuid, cancellation: &CancellationToken) -> CoordinationResult<()> {
        self.bus
            .publish(
                AgentEventKind::AgentKilled,
                AgentEventPayload {
                    agent_id,
                    status: AgentStatus::Killed,
                },
                None,
                cancellation,
            )
            .await
    }

    pub async fn publish_status_changed(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        self.bus
            .publish(
                AgentEventKind::AgentStatusChanged,
                AgentEventPayload { agent_id, status },
                None,
                cancellation,
            )
            .await
    }
}

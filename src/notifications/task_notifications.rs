//! Thin façade binding `TaskBus` to the subject filters `TaskService` needs
//! (spec §4.4).

use uuid::Uuid;

use crate::bus::task_bus::{for_agent, for_persona, TaskBus, TaskEventFilter, TaskEventKind, TaskEventPayload};
use crate::bus::EventFilter;
use crate::cancellation::CancellationToken;
use crate::error::{CoordinationError, CoordinationResult};

#[derive(Clone)]
pub struct WorkItemNotificationService {
    bus: TaskBus,
}

impl WorkItemNotificationService {
    pub fn new(bus: TaskBus) -> Self {
        Self { bus }
    }

    pub fn subscribe_for_agent(
        &self,
        agent_id: Uuid,
        cancellation: CancellationToken,
    ) -> CoordinationResult<crate::bus::Subscription<TaskEventKind, TaskEventPayload>> {
        let filter = EventFilter::new(
            [
                TaskEventKind::TaskCreated,
                TaskEventKind::TaskClaimed,
                TaskEventKind::TaskCompleted,
                TaskEventKind::TaskFailed,
            ],
            for_agent(agent_id),
        );
        self.bus.subscribe(filter, cancellation)
    }

    pub fn subscribe_for_persona(
        &self,
        persona_id: &str,
        cancellation: CancellationToken,
    ) -> CoordinationResult<crate::bus::Subscription<TaskEventKind, TaskEventPayload>> {
        if persona_id.trim().is_empty() {
            return Err(CoordinationError::invalid_input("persona_id must not be blank"));
        }
        let filter: TaskEventFilter = EventFilter::new(
            [TaskEventKind::TaskCreated],
            for_persona(persona_id.to_lowercase()),
        );
        self.bus.subscribe(filter, cancellation)
    }

    /// Publishes `TaskCreated`. When both `agent_id` and `persona_id` are
    /// set, dual delivery applies: the agent-scoped subscriber and the
    /// persona-scoped subscriber each see it once (spec §4.2).
    pub async fn publish_task_created(
        &self,
        task_id: Uuid,
        agent_id: Option<Uuid>,
        persona_id_normalized: Option<String>,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        self.bus
            .publish(
                TaskEventKind::TaskCreated,
                TaskEventPayload {
                    task_id,
                    agent_id,
                    persona_id_normalized,
                },
                None,
                cancellation,
            )
            .await
    }

    pub async fn publish_task_claimed(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        self.bus
            .publish(
                TaskEventKind::TaskClaimed,
                TaskEventPayload {
                    task_id,
                    agent_id: Some(agent_id),
                    persona_id_normalized: None,
                },
                None,
                cancellation,
            )
            .await
    }

    pub async fn publish_task_completed(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        self.bus
            .publish(
                TaskEventKind::TaskCompleted,
                TaskEventPayload {
                    task_id,
                    agent_id: Some(agent_id),
                    persona_id_normalized: None,
                },
                None,
                cancellation,
            )
            .await
    }

    pub async fn publish_task_failed(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        self.bus
            .publish(
                TaskEventKind::TaskFailed,
                TaskEventPayload {
                    task_id,
                    agent_id: Some(agent_id),
                    persona_id_normalized: None,
                },
                None,
                cancellation,
            )
            .await
    }
}

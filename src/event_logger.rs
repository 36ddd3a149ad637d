//! Subscribes to all three buses with an unfiltered subject predicate and
//! appends one `EventLogEntry` per envelope (spec §4.3). Logging failures
//! are surfaced via `tracing::warn!` and never abort the originating
//! operation.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::bus::agent_bus::{any as any_agent, AgentBus, AgentEventKind};
use crate::bus::memory_bus::{MemoryBus, MemoryEventKind};
use crate::bus::task_bus::{TaskBus, TaskEventKind};
use crate::bus::EventFilter;
use crate::cancellation::CancellationToken;
use crate::domain::{EventLogEntry, EventSeverity};
use crate::store::EventLogRepository;

/// Table-driven severity per spec §4.3 ("Severity mapping is table-driven
/// per event kind"): terminal-failure kinds outrank routine lifecycle noise.
fn task_event_severity(kind: TaskEventKind) -> EventSeverity {
    match kind {
        TaskEventKind::TaskFailed => EventSeverity::Warning,
        TaskEventKind::TaskCreated | TaskEventKind::TaskClaimed | TaskEventKind::TaskCompleted => {
            EventSeverity::Information
        }
    }
}

fn agent_event_severity(kind: AgentEventKind, status: crate::domain::AgentStatus) -> EventSeverity {
    use crate::domain::AgentStatus;
    match kind {
        AgentEventKind::AgentKilled => EventSeverity::Warning,
        AgentEventKind::AgentStatusChanged if status == AgentStatus::Unhealthy => EventSeverity::Warning,
        AgentEventKind::AgentRegistered | AgentEventKind::AgentStatusChanged => EventSeverity::Information,
    }
}

fn memory_event_severity(kind: MemoryEventKind) -> EventSeverity {
    match kind {
        MemoryEventKind::MemorySaved | MemoryEventKind::MemoryUpdated => EventSeverity::Information,
    }
}

pub struct EventLogger {
    store: Arc<dyn EventLogRepository>,
}

impl EventLogger {
    pub fn new(store: Arc<dyn EventLogRepository>) -> Self {
        Self { store }
    }

    /// Spawns the three background consumer tasks. Returned cancellation
    /// token shuts them all down when dropped/cancelled by the composition
    /// root during shutdown.
    pub fn spawn(self: Arc<Self>, task_bus: &TaskBus, agent_bus: &AgentBus, memory_bus: &MemoryBus) -> CancellationToken {
        let shutdown = CancellationToken::new();

        let task_filter = EventFilter::new(
            [
                TaskEventKind::TaskCreated,
                TaskEventKind::TaskClaimed,
                TaskEventKind::TaskCompleted,
                TaskEventKind::TaskFailed,
            ],
            |_: &crate::bus::task_bus::TaskEventPayload| true,
        );
        if let Ok(sub) = task_bus.subscribe(task_filter, shutdown.clone()) {
            let logger = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(envelope) = sub.next().await {
                    let entry = EventLogEntry::new(
                        format!("{:?}", envelope.kind),
                        task_event_severity(envelope.kind),
                        Some(envelope.payload.task_id.to_string()),
                        Some("WorkItem".to_string()),
                        json!({ "agentId": envelope.payload.agent_id }),
                        envelope.timestamp,
                    );
                    if let Err(err) = logger.store.append(&entry).await {
                        warn!(error = %err, "failed to append task event to event log");
                    }
                }
            });
        }

        let agent_filter = EventFilter::new(
            [
                AgentEventKind::AgentRegistered,
                AgentEventKind::AgentKilled,
                AgentEventKind::AgentStatusChanged,
            ],
            any_agent(),
        );
        if let Ok(sub) = agent_bus.subscribe(agent_filter, shutdown.clone()) {
            let logger = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(envelope) = sub.next().await {
                    let entry = EventLogEntry::new(
                        format!("{:?}", envelope.kind),
                        agent_event_severity(envelope.kind, envelope.payload.status),
                        Some(envelope.payload.agent_id.to_string()),
                        Some("Agent".to_string()),
                        json!({ "status": format!("{:?}", envelope.payload.status) }),
                        envelope.timestamp,
                    );
                    if let Err(err) = logger.store.append(&entry).await {
                        warn!(error = %err, "failed to append agent event to event log");
                    }
                }
            });
        }

        let memory_filter = EventFilter::new(
            [MemoryEventKind::MemorySaved, MemoryEventKind::MemoryUpdated],
            |_: &crate::bus::memory_bus::MemoryEventPayload| true,
        );
        if let Ok(sub) = memory_bus.subscribe(memory_filter, shutdown.clone()) {
            let logger = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(envelope) = sub.next().await {
                    let entry = EventLogEntry::new(
                        format!("{:?}", envelope.kind),
                        memory_event_severity(envelope.kind),
                        Some(format!("{}/{}", envelope.payload.namespace, envelope.payload.key)),
                        Some("MemoryEntry".to_string()),
                        json!({}),
                        envelope.timestamp,
                    );
                    if let Err(err) = logger.store.append(&entry).await {
                        warn!(error = %err, "failed to append memory event to event log");
                    }
                }
            });
        }

        shutdown
    }
}

//! EventLog entity — spec §3. Append-only, never consulted for routing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventSeverity {
    Information,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub severity: EventSeverity,
    pub payload: serde_json::Value,
    pub tags: Option<Vec<String>>,
}

impl EventLogEntry {
    pub fn new(
        event_type: impl Into<String>,
        severity: EventSeverity,
        entity_id: Option<String>,
        entity_type: Option<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: now,
            actor: None,
            correlation_id: None,
            entity_id,
            entity_type,
            severity,
            payload,
            tags: None,
        }
    }
}

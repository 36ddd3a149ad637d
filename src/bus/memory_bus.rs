//! Concrete `EventBus` instantiation for keyed memory events
//! (spec §4.4 `MemoryNotificationService`).

use super::{EventBus, EventEnvelope, EventFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryEventKind {
    MemorySaved,
    MemoryUpdated,
}

#[derive(Debug, Clone)]
pub struct MemoryEventPayload {
    pub namespace: String,
    pub key: String,
}

pub type MemoryBus = EventBus<MemoryEventKind, MemoryEventPayload>;
pub type MemoryEventEnvelope = EventEnvelope<MemoryEventKind, MemoryEventPayload>;
pub type MemoryEventFilter = EventFilter<MemoryEventKind, MemoryEventPayload>;

pub fn for_key(namespace: String, key: String) -> impl Fn(&MemoryEventPayload) -> bool {
    move |payload: &MemoryEventPayload| payload.namespace == namespace && payload.key == key
}

pub fn for_namespace(namespace: String) -> impl Fn(&MemoryEventPayload) -> bool {
    move |payload: &MemoryEventPayload| payload.namespace == namespace
}

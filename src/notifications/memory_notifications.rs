//! Thin façade binding `MemoryBus` to the subject filters `MemoryService`
//! needs (spec §4.4).

use crate::bus::memory_bus::{for_key, MemoryBus, MemoryEventKind, MemoryEventPayload};
use crate::bus::EventFilter;
use crate::cancellation::CancellationToken;
use crate::error::CoordinationResult;

#[derive(Clone)]
pub struct MemoryNotificationService {
    bus: MemoryBus,
}

impl MemoryNotificationService {
    pub fn new(bus: MemoryBus) -> Self {
        Self { bus }
    }

    pub fn subscribe_for_key(
        &self,
        namespace: &str,
        key: &str,
        cancellation: CancellationToken,
    ) -> CoordinationResult<crate::bus::Subscription<MemoryEventKind, MemoryEventPayload>> {
        let filter = EventFilter::new(
            [MemoryEventKind::MemorySaved, MemoryEventKind::MemoryUpdated],
            for_key(namespace.to_string(), key.to_string()),
        );
        self.bus.subscribe(filter, cancellation)
    }

    pub async fn publish_saved(
        &self,
        namespace: String,
        key: String,
        was_update: bool,
        cancellation: &CancellationToken,
    ) -> CoordinationResult<()> {
        let kind = if was_update {
            MemoryEventKind::MemoryUpdated
        } else {
            MemoryEventKind::MemorySaved
        };
        self.bus
            .publish(kind, MemoryEventPayload { namespace, key }, None, cancellation)
            .await
    }
}

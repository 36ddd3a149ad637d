//! Save/read/list keyed values by namespace; emit memory events —
//! spec §4.7.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::cancellation::CancellationToken;
use crate::clock::SharedClock;
use crate::domain::memory::DEFAULT_NAMESPACE;
use crate::domain::MemoryEntry;
use crate::error::{CoordinationError, CoordinationResult};
use crate::notifications::MemoryNotificationService;
use crate::store::MemoryRepository;

pub struct MemoryService {
    repository: Arc<dyn MemoryRepository>,
    notifications: MemoryNotificationService,
    clock: SharedClock,
}

impl MemoryService {
    pub fn new(repository: Arc<dyn MemoryRepository>, notifications: MemoryNotificationService, clock: SharedClock) -> Self {
        Self {
            repository,
            notifications,
            clock,
        }
    }

    fn namespace_or_default(namespace: Option<String>) -> String {
        namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    #[instrument(skip(self, value, metadata))]
    pub async fn save(
        &self,
        key: String,
        value: String,
        namespace: Option<String>,
        value_type: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> CoordinationResult<MemoryEntry> {
        if key.trim().is_empty() {
            return Err(CoordinationError::invalid_input("key must not be blank"));
        }
        if value.is_empty() {
            return Err(CoordinationError::invalid_input("value must not be blank"));
        }
        let namespace = Self::namespace_or_default(namespace);
        let now = self.clock.now();

        let existing = self.repository.get(&namespace, &key).await?;
        let entry = if let Some(mut existing) = existing {
            existing.value = value;
            existing.value_type = value_type.unwrap_or(existing.value_type);
            existing.metadata = metadata.or(existing.metadata);
            existing.recompute_size();
            existing.last_updated_at = now;
            existing
        } else {
            MemoryEntry::new(namespace.clone(), key.clone(), value, value_type, metadata, now)
        };

        let was_update = self.repository.upsert(&entry).await?;
        self.notifications
            .publish_saved(namespace, key, was_update, &CancellationToken::new())
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn read(&self, key: &str, namespace: Option<String>) -> CoordinationResult<Option<MemoryEntry>> {
        let namespace = Self::namespace_or_default(namespace);
        let Some(mut entry) = self.repository.get(&namespace, key).await? else {
            return Ok(None);
        };
        let now = self.clock.now();
        self.repository.mark_accessed(entry.id, now).await?;
        entry.mark_accessed(now);
        Ok(Some(entry))
    }

    pub async fn list(&self, namespace: Option<String>) -> CoordinationResult<Vec<MemoryEntry>> {
        self.repository.list(namespace.as_deref()).await
    }

    /// Long-poll read: returns immediately on a cache hit, else subscribes
    /// and re-reads on each wakeup (events are triggers, not data — spec
    /// §4.7).
    #[instrument(skip(self, cancellation))]
    pub async fn wait_for_key(
        &self,
        key: &str,
        namespace: Option<String>,
        timeout: Duration,
        cancellation: CancellationToken,
    ) -> CoordinationResult<MemoryEntry> {
        let namespace = Self::namespace_or_default(namespace);

        if let Some(entry) = self.read(key, Some(namespace.clone())).await? {
            return Ok(entry);
        }

        let sub = self.notifications.subscribe_for_key(&namespace, key, cancellation.clone())?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(CoordinationError::timeout(format!(
                    "timed out waiting for memory key {namespace}/{key}"
                )));
            }
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(CoordinationError::cancelled("wait_for_memory_key cancelled"));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(CoordinationError::timeout(format!(
                        "timed out waiting for memory key {namespace}/{key}"
                    )));
                }
                _ = sub.next() => {
                    if let Some(entry) = self.read(key, Some(namespace.clone())).await? {
                        return Ok(entry);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory_bus::MemoryBus;
    use crate::bus::FullMode;
    use crate::clock::SystemClock;
    use crate::store::create_test_pool;
    use crate::store::migrations::Migrator;
    use crate::store::sqlite::SqliteStore;

    async fn harness() -> MemoryService {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(&pool).run().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let notifications = MemoryNotificationService::new(MemoryBus::new(16, FullMode::Wait));
        MemoryService::new(store, notifications, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn save_then_read_round_trips_and_counts_access() {
        let service = harness().await;
        service
            .save("k".into(), "v".into(), Some("ns".into()), None, None)
            .await
            .unwrap();
        let first = service.read("k", Some("ns".into())).await.unwrap().unwrap();
        assert_eq!(first.value, "v");
        assert_eq!(first.access_count, 1);
        let second = service.read("k", Some("ns".into())).await.unwrap().unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[tokio::test]
    async fn read_missing_key_returns_none_not_error() {
        let service = harness().await;
        assert!(service.read("missing", Some("ns".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wait_for_key_returns_immediately_on_existing_value() {
        let service = harness().await;
        service
            .save("k".into(), "v".into(), Some("ns".into()), None, None)
            .await
            .unwrap();
        let entry = service
            .wait_for_key("k", Some("ns".into()), Duration::from_millis(100), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(entry.value, "v");
    }

    #[tokio::test]
    async fn wait_for_key_times_out_when_never_written() {
        let service = harness().await;
        let result = service
            .wait_for_key("missing", Some("ns".into()), Duration::from_millis(80), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_for_key_wakes_on_concurrent_save() {
        let service = Arc::new(harness().await);
        let waiter = Arc::clone(&service);
        let wait_handle = tokio::spawn(async move {
            waiter
                .wait_for_key("k", Some("ns".into()), Duration::from_millis(500), CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        service
            .save("k".into(), "v".into(), Some("ns".into()), None, None)
            .await
            .unwrap();

        let entry = wait_handle.await.unwrap().unwrap();
        assert_eq!(entry.value, "v");
    }
}

//! MemoryEntry entity — spec §3. Adopts the extended shape per the Open
//! Question resolution recorded in DESIGN.md.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub metadata: Option<serde_json::Value>,
    pub is_compressed: bool,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub access_count: i64,
}

impl MemoryEntry {
    pub fn new(
        namespace: String,
        key: String,
        value: String,
        value_type: Option<String>,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let size = value.len() as i64;
        Self {
            id: Uuid::new_v4(),
            namespace,
            key,
            value,
            value_type: value_type.unwrap_or_else(|| "json".to_string()),
            metadata,
            is_compressed: false,
            size,
            created_at: now,
            last_updated_at: now,
            accessed_at: None,
            access_count: 0,
        }
    }

    /// Re-derives `size` from `value`. Called on every write so the field
    /// is never trusted from caller input (DESIGN.md Open Question note).
    pub fn recompute_size(&mut self) {
        self.size = self.value.len() as i64;
    }

    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.accessed_at = Some(now);
        self.access_count += 1;
    }
}

pub const DEFAULT_NAMESPACE: &str = "default";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_reflects_byte_length() {
        let entry = MemoryEntry::new(
            "ns".into(),
            "k".into(),
            "héllo".into(),
            None,
            None,
            Utc::now(),
        );
        assert_eq!(entry.size, "héllo".len() as i64);
    }

    #[test]
    fn mark_accessed_increments_count() {
        let mut entry = MemoryEntry::new("ns".into(), "k".into(), "v".into(), None, None, Utc::now());
        assert_eq!(entry.access_count, 0);
        entry.mark_accessed(Utc::now());
        entry.mark_accessed(Utc::now());
        assert_eq!(entry.access_count, 2);
    }
}

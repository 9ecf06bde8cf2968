use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use time::OffsetDateTime;

use crate::KvStore;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Option<OffsetDateTime>,
}

impl Record {
    fn new(value: &str, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn live(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(deadline) => deadline > now,
            None => true,
        }
    }
}

/// In-memory store used in tests and single-node development. Expired
/// entries read as absent; `set_nx` resolves its race through the
/// shard-locked entry API.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Record>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries whose deadline has passed.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        self.entries.retain(|_, record| record.live(now));
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .entries
            .get(key)
            .filter(|record| record.live(now))
            .map(|record| record.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        self.entries
            .insert(key.to_string(), Record::new(value, ttl, now));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = OffsetDateTime::now_utc();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().live(now) {
                    Ok(false)
                } else {
                    occupied.insert(Record::new(value, Some(ttl), now));
                    Ok(true)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Record::new(value, Some(ttl), now));
                Ok(true)
            }
        }
    }
}

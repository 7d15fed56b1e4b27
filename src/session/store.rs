use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;
use tower_sessions::{ExpiredDeletion, SessionStore};

/// Default number of sessions kept by [`MemorySessionStore`].
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

fn is_active(record: &Record) -> bool {
    record.expiry_date > OffsetDateTime::now_utc()
}

/// In-process session store with LRU eviction once `capacity` is reached.
///
/// Expired records load as absent; [`ExpiredDeletion::delete_expired`] drops
/// them for good.
pub struct MemorySessionStore {
    records: Mutex<LruCache<Id, Record>>,
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore").finish_non_exhaustive()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }

    /// A zero capacity is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.records.lock().await;
        while records.contains(&record.id) {
            record.id = Id::default();
        }
        records.put(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.records.lock().await.put(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        let mut records = self.records.lock().await;
        let expired = match records.get(id) {
            Some(record) if is_active(record) => return Ok(Some(record.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            records.pop(id);
        }
        Ok(None)
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        self.records.lock().await.pop(id);
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for MemorySessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let mut records = self.records.lock().await;
        let expired: Vec<Id> = records
            .iter()
            .filter(|(_, record)| !is_active(record))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            records.pop(id);
        }
        Ok(())
    }
}

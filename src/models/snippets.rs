use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::error::ModelError;

/// Maximum number of snippets returned by [`SnippetStore::latest`].
pub const LATEST_LIMIT: usize = 10;

/// A stored snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Snippet {
    /// Whether the snippet's expiry lies at or before `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }
}

/// Snippet persistence.
#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Insert a snippet that expires `expires_days` from now and return its id.
    async fn insert(&self, title: &str, content: &str, expires_days: u32)
        -> Result<i64, ModelError>;

    /// Fetch a live snippet. Expired or absent rows yield [`ModelError::NoRecord`].
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// The most recent live snippets, newest first, at most [`LATEST_LIMIT`].
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}

/// Snippet store backed by an ordered in-process map.
#[derive(Default)]
pub struct MemorySnippetStore {
    rows: RwLock<BTreeMap<i64, Snippet>>,
}

impl MemorySnippetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with explicit timestamps, bypassing the expiry calculation.
    pub async fn insert_at(
        &self,
        title: &str,
        content: &str,
        created: OffsetDateTime,
        expires: OffsetDateTime,
    ) -> i64 {
        let mut rows = self.rows.write().await;
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        rows.insert(
            id,
            Snippet {
                id,
                title: title.to_string(),
                content: content.to_string(),
                created,
                expires,
            },
        );
        id
    }

    /// Number of stored rows, expired ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SnippetStore for MemorySnippetStore {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: u32,
    ) -> Result<i64, ModelError> {
        let created = OffsetDateTime::now_utc();
        let expires = created + Duration::days(i64::from(expires_days));
        Ok(self.insert_at(title, content, created, expires).await)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let now = OffsetDateTime::now_utc();
        self.rows
            .read()
            .await
            .get(&id)
            .filter(|snippet| !snippet.is_expired_at(now))
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .rows
            .read()
            .await
            .values()
            .rev()
            .filter(|snippet| !snippet.is_expired_at(now))
            .take(LATEST_LIMIT)
            .cloned()
            .collect())
    }
}

//! crates/interview_core/src/session_registry.rs
//!
//! Idempotent avatar-session creation. Concurrent requests for the same key
//! share one upstream creation; a recently created session is handed back
//! instead of starting another one.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::domain::AvatarSession;
use crate::ports::{CachedSession, PortResult, SessionCache};

type PendingCreation = Shared<BoxFuture<'static, PortResult<CachedSession>>>;

//=========================================================================================
// In-Memory Cache
//=========================================================================================

/// Process-local `SessionCache`. Entries are lost on restart.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: RwLock<HashMap<String, CachedSession>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &str) -> PortResult<Option<CachedSession>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CachedSession) -> PortResult<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_by_session_id(&self, session_id: &str) -> PortResult<Option<String>> {
        let mut entries = self.entries.write().await;
        let key = entries
            .iter()
            .find(|(_, entry)| entry.session.session_id == session_id)
            .map(|(key, _)| key.clone());
        if let Some(key) = &key {
            entries.remove(key);
        }
        Ok(key)
    }

    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> PortResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at >= cutoff);
        Ok(before - entries.len())
    }
}

//=========================================================================================
// Registry
//=========================================================================================

pub struct SessionRegistry {
    cache: Arc<dyn SessionCache>,
    in_flight: Arc<Mutex<HashMap<String, PendingCreation>>>,
    freshness: Duration,
}

impl SessionRegistry {
    pub fn new(cache: Arc<dyn SessionCache>, freshness: Duration) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            freshness,
        }
    }

    fn is_fresh(&self, entry: &CachedSession) -> bool {
        Utc::now() - entry.created_at < self.freshness
    }

    /// Returns the cached session for `key` while it is fresh, joins a creation
    /// already running for `key`, or runs `create` and caches its result.
    ///
    /// A failed creation is not cached, so the next caller tries again.
    pub async fn create_or_get<F, Fut>(&self, key: &str, create: F) -> PortResult<CachedSession>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PortResult<AvatarSession>> + Send + 'static,
    {
        let pending = {
            let mut in_flight = self.in_flight.lock().await;

            if let Some(existing) = in_flight.get(key) {
                debug!(key, "Joining in-flight avatar session creation");
                existing.clone()
            } else {
                if let Some(cached) = self.cache.get(key).await? {
                    if self.is_fresh(&cached) {
                        info!(key, session_id = %cached.session.session_id, "Reusing cached avatar session");
                        return Ok(cached);
                    }
                    info!(key, session_id = %cached.session.session_id, "Cached avatar session is stale, recreating");
                    self.cache.remove(key).await?;
                }

                let creation = self.spawn_creation(key.to_string(), create());
                in_flight.insert(key.to_string(), creation.clone());
                creation
            }
        };

        pending.await
    }

    fn spawn_creation<Fut>(&self, key: String, upstream: Fut) -> PendingCreation
    where
        Fut: Future<Output = PortResult<AvatarSession>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();

        async move {
            let outcome = match upstream.await {
                Ok(session) => {
                    let entry = CachedSession {
                        session,
                        created_at: Utc::now(),
                        status: "created".to_string(),
                    };
                    cache.put(&key, entry.clone()).await.map(|_| entry)
                }
                Err(e) => Err(e),
            };
            // The cache is written before the in-flight slot is released.
            in_flight.lock().await.remove(&key);
            outcome
        }
        .boxed()
        .shared()
    }

    /// Forgets the cached entry pointing at `session_id`, if any.
    pub async fn forget_session(&self, session_id: &str) -> PortResult<Option<String>> {
        self.cache.remove_by_session_id(session_id).await
    }

    /// Drops every entry older than the freshness window.
    pub async fn evict_stale(&self) -> PortResult<usize> {
        self.cache.evict_older_than(Utc::now() - self.freshness).await
    }
}

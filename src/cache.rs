use crate::drops::NpcDropData;
use crate::error::FetchError;
use crate::wiki::DropFetcher;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `Ok(None)` is the valid "creature has no drop table" outcome.
pub type FetchOutcome = Result<Option<Arc<NpcDropData>>, FetchError>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Creature identity for caching: the numeric id when known, otherwise the
/// normalized name plus level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(i32),
    Name { name: String, level: i32 },
}

impl CacheKey {
    fn from_request(npc_id: i32, name: &str, level: i32) -> Self {
        if npc_id > 0 {
            CacheKey::Id(npc_id)
        } else {
            CacheKey::Name {
                name: name.trim().to_lowercase(),
                level,
            }
        }
    }
}

/// Session cache over [`DropFetcher`] with per-key single-flight: concurrent
/// lookups for the same creature share one underlying fetch and observe the
/// same result or the same failure.
///
/// "No drop table" results are not cached; only the in-flight entry collapses
/// concurrent misses, and a later lookup retries. Successful records live for
/// the rest of the session.
pub struct DropCache {
    fetcher: Arc<DropFetcher>,
    ready: Mutex<HashMap<CacheKey, Arc<NpcDropData>>>,
    inflight: Mutex<HashMap<CacheKey, SharedFetch>>,
}

impl DropCache {
    pub fn new(fetcher: Arc<DropFetcher>) -> Self {
        Self {
            fetcher,
            ready: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Get drop data for a creature, fetching it at most once per key no
    /// matter how many callers overlap.
    pub async fn get(&self, npc_id: i32, name: &str, level: i32) -> FetchOutcome {
        let key = CacheKey::from_request(npc_id, name, level);

        if let Some(hit) = self.ready.lock().unwrap().get(&key) {
            return Ok(Some(hit.clone()));
        }

        // Join an in-flight fetch for this key or start one. The locks are
        // never held across an await.
        let fut = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    tracing::debug!("Fetching drops for key {:?}", key);
                    let fetcher = self.fetcher.clone();
                    let name = name.to_string();
                    let fut: SharedFetch = async move {
                        fetcher
                            .fetch(npc_id, &name, level)
                            .await
                            .map(|opt| opt.map(Arc::new))
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        let outcome = fut.await;

        if let Ok(Some(data)) = &outcome {
            let mut ready = self.ready.lock().unwrap();
            ready.insert(key.clone(), data.clone());
            if data.npc_id > 0 {
                ready.insert(CacheKey::Id(data.npc_id), data.clone());
            }
        }
        self.inflight.lock().unwrap().remove(&key);

        outcome
    }

    /// Uncached proxy to the wiki title search; search results are cheap
    /// relative to a page fetch and parse.
    pub async fn search_names(&self, query: &str) -> Result<Vec<String>, FetchError> {
        self.fetcher.search_npc_names(query).await
    }
}

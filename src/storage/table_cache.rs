//! Table metadata cache with a single shared expiration window

use crate::backend::TableInfo;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in expiry for a `ttl` too long to represent as an instant
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, TableInfo>,
    /// `None` until the first window opens
    expires_at: Option<Instant>,
}

/// Cache of per-table metadata.
///
/// The whole cache shares one expiration instant: it is either fully fresh
/// or, once the instant passes, cleared wholesale on the next
/// [`expire_if_stale`](Self::expire_if_stale). There is no per-entry expiry.
/// All access goes through a mutex that is never held across an await.
#[derive(Debug)]
pub struct TableInfoCache {
    state: Mutex<CacheState>,
    enabled: bool,
    ttl: Duration,
}

impl TableInfoCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            enabled,
            ttl,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// If the window has passed, clear every entry and open a new window of
    /// `ttl` from now. Returns true when the cache was reset.
    pub fn expire_if_stale(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.expires_at {
            Some(expires_at) if now < expires_at => false,
            _ => {
                state.entries.clear();
                let expires_at = now
                    .checked_add(self.ttl)
                    .unwrap_or_else(|| now + FAR_FUTURE);
                state.expires_at = Some(expires_at);
                true
            }
        }
    }

    /// Cached info for `table`. Always `None` when caching is disabled.
    pub fn get(&self, table: &str) -> Option<TableInfo> {
        if !self.enabled {
            return None;
        }
        self.state.lock().entries.get(table).cloned()
    }

    pub fn insert(&self, table: &str, info: TableInfo) {
        if !self.enabled {
            return;
        }
        self.state.lock().entries.insert(table.to_string(), info);
    }

    pub fn evict(&self, table: &str) {
        self.state.lock().entries.remove(table);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.state.lock().expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FamilyInfo;

    fn info(families: &[&str]) -> TableInfo {
        TableInfo {
            families: families
                .iter()
                .map(|name| FamilyInfo {
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_access_opens_a_window() {
        let cache = TableInfoCache::new(true, Duration::from_secs(60));
        assert!(cache.expires_at().is_none());
        assert!(cache.expire_if_stale());
        assert!(!cache.expire_if_stale());
        assert!(cache.expires_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_clears_everything_at_once() {
        let cache = TableInfoCache::new(true, Duration::from_secs(60));
        cache.expire_if_stale();
        cache.insert("a", info(&["f"]));
        cache.insert("b", info(&[]));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cache.expire_if_stale());
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.expire_if_stale());
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_never_expires() {
        let cache = TableInfoCache::new(true, Duration::from_secs(u64::MAX));
        assert!(cache.expire_if_stale());
        cache.insert("a", info(&["f"]));

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(!cache.expire_if_stale());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn disabled_cache_never_answers() {
        let cache = TableInfoCache::new(false, Duration::from_secs(60));
        cache.insert("a", info(&["f"]));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_removes_one_entry() {
        let cache = TableInfoCache::new(true, Duration::from_secs(60));
        cache.insert("a", info(&["f"]));
        cache.insert("b", info(&["f"]));
        cache.evict("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }
}

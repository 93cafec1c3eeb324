//! Single-slot item cache with stale fallback.
//!
//! Serves the last successful upstream batch while it is younger than the
//! TTL. Past the TTL it refreshes; if the refresh fails, the previous batch
//! is served as stale. A failed refresh never evicts the slot.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{FetchOutcome, Item};
use crate::upstream::{Upstream, UpstreamError, UpstreamPage};

/// Default bound on a single upstream call.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The cached batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub items: Vec<Item>,
    pub cached_at: Instant,
}

/// Item cache shared by every request to the cache endpoint.
pub struct ItemCache {
    upstream: Arc<dyn Upstream>,
    ttl: Duration,
    fetch_timeout: Duration,
    slot: RwLock<Option<CacheEntry>>,
    /// Held for the duration of a refresh so concurrent callers share it.
    refresh: Mutex<()>,
}

impl ItemCache {
    /// Create an empty cache.
    pub fn new(upstream: Arc<dyn Upstream>, ttl: Duration) -> Self {
        Self {
            upstream,
            ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Override the bound on a single upstream call.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current cached batch, fresh or not.
    pub fn entry(&self) -> Option<CacheEntry> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get items, refreshing from upstream when the cached batch is missing or expired.
    ///
    /// Never fails: every upstream problem resolves to `Stale` or `Error`.
    pub async fn get(&self) -> FetchOutcome {
        if let Some(hit) = self.fresh_hit() {
            return hit;
        }

        let _flight = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(hit) = self.fresh_hit() {
            return hit;
        }

        match self.fetch_upstream().await {
            Ok(page) => self.store(page),
            Err(err) => self.fall_back(&err),
        }
    }

    fn fresh_hit(&self) -> Option<FetchOutcome> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        let entry = slot.as_ref()?;
        let age = entry.cached_at.elapsed();
        if age >= self.ttl {
            return None;
        }

        debug!("Serving {} cached item(s), age {:?}", entry.items.len(), age);
        Some(FetchOutcome::Fresh {
            items: entry.items.clone(),
            cached: true,
            age: Some(age),
            rate_limit: None,
        })
    }

    async fn fetch_upstream(&self) -> Result<UpstreamPage, UpstreamError> {
        match tokio::time::timeout(self.fetch_timeout, self.upstream.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Transport(format!(
                "timed out after {:?}",
                self.fetch_timeout
            ))),
        }
    }

    fn store(&self, page: UpstreamPage) -> FetchOutcome {
        let UpstreamPage { items, rate_limit } = page;

        if let Some(rl) = rate_limit {
            debug!(
                "Upstream rate limit: remaining={:?} limit={:?} reset={:?}",
                rl.remaining, rl.limit, rl.reset
            );
        }

        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(CacheEntry {
            items: items.clone(),
            cached_at: Instant::now(),
        });
        info!("Cache refreshed with {} item(s)", items.len());

        FetchOutcome::Fresh {
            items,
            cached: false,
            age: None,
            rate_limit,
        }
    }

    fn fall_back(&self, err: &UpstreamError) -> FetchOutcome {
        if let Some(entry) = self.entry() {
            let reason = err.stale_reason();
            warn!("Refresh failed ({}); {}", err, reason);
            return FetchOutcome::Stale {
                items: entry.items,
                reason,
            };
        }

        error!("Refresh failed with no cached items: {}", err);
        FetchOutcome::Error {
            message: err.client_message(),
            status: err.status(),
        }
    }
}

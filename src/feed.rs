//! Item feed client.
//!
//! Calls the cache endpoint (or an in-process cache) and keeps the latest
//! result as observable [`FeedState`].

pub mod http;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
pub use http::HttpFeedSource;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ItemCache;
use crate::domain::{FetchOutcome, Item};

/// What the feed currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    pub items: Vec<Item>,

    /// True while at least one fetch is in flight.
    pub loading: bool,

    /// Last failure, or the stale-data notice. Cleared when a fetch starts.
    pub error: Option<String>,

    pub is_stale: bool,

    pub is_cached: bool,
}

/// Errors reaching the cache endpoint.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Request to cache endpoint failed: {0}")]
    Transport(String),

    #[error("Invalid response from cache endpoint: {0}")]
    Decode(String),
}

/// Where the feed gets its outcomes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<FetchOutcome, FeedError>;
}

/// Feed source backed by an in-process cache.
pub struct LocalFeedSource {
    cache: Arc<ItemCache>,
}

impl LocalFeedSource {
    pub fn new(cache: Arc<ItemCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl FeedSource for LocalFeedSource {
    async fn fetch(&self) -> Result<FetchOutcome, FeedError> {
        Ok(self.cache.get().await)
    }
}

struct Inner {
    source: Arc<dyn FeedSource>,
    state: watch::Sender<FeedState>,
    in_flight: AtomicUsize,
    closed: CancellationToken,
}

/// Shared handle to the feed. Clones observe and update the same state.
#[derive(Clone)]
pub struct ItemFeed {
    inner: Arc<Inner>,
}

impl ItemFeed {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                state: watch::Sender::new(FeedState::default()),
                in_flight: AtomicUsize::new(0),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    /// Fetch once and fold the result into the state.
    ///
    /// Overlapping calls are allowed; whichever resolves last wins, and
    /// `loading` stays true until all of them have resolved.
    pub async fn refetch(&self) {
        if self.begin() {
            self.complete().await;
        }
    }

    /// Like [`ItemFeed::refetch`], but runs on a spawned task.
    ///
    /// `loading` is already true when this returns.
    pub fn spawn_refetch(&self) -> JoinHandle<()> {
        let started = self.begin();
        let feed = self.clone();
        tokio::spawn(async move {
            if started {
                feed.complete().await;
            }
        })
    }

    fn begin(&self) -> bool {
        let inner = &self.inner;
        if inner.closed.is_cancelled() {
            return false;
        }

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
        true
    }

    async fn complete(&self) {
        let inner = &self.inner;
        let result = tokio::select! {
            biased;
            () = inner.closed.cancelled() => {
                debug!("Feed closed, discarding in-flight fetch");
                return;
            }
            result = inner.source.fetch() => result,
        };

        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        inner.state.send_modify(|state| {
            state.loading = inner.in_flight.load(Ordering::SeqCst) > 0;
            apply(state, result);
        });
    }

    /// Stop accepting results. Fetches resolving afterwards are ignored.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

fn apply(state: &mut FeedState, result: Result<FetchOutcome, FeedError>) {
    match result {
        Ok(FetchOutcome::Fresh {
            items,
            cached,
            rate_limit,
            ..
        }) => {
            if let Some(rl) = rate_limit {
                debug!(
                    "Upstream rate limit: remaining={:?} limit={:?} reset={:?}",
                    rl.remaining, rl.limit, rl.reset
                );
            }
            debug!("Feed received {} item(s) (cached={})", items.len(), cached);
            state.items = items;
            state.error = None;
            state.is_stale = false;
            state.is_cached = cached;
        }
        Ok(FetchOutcome::Stale { items, reason }) => {
            warn!("Feed received {} stale item(s): {}", items.len(), reason);
            state.items = items;
            state.error = Some(reason.message().to_string());
            state.is_stale = true;
            state.is_cached = true;
        }
        Ok(FetchOutcome::Error { message, status }) => {
            warn!("Feed fetch failed ({}): {}", status, message);
            state.error = Some(message);
        }
        Err(e) => {
            warn!("Feed fetch failed: {}", e);
            state.error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StaleReason, test_item};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Reply = Result<FetchOutcome, FeedError>;

    /// Source whose calls block until the test answers them.
    #[derive(Default)]
    struct GatedSource {
        pending: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn gate(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl FeedSource for GatedSource {
        async fn fetch(&self) -> Result<FetchOutcome, FeedError> {
            let rx = self.pending.lock().unwrap().pop_front().unwrap();
            self.calls.fetch_add(1, Ordering::SeqCst);
            rx.await.unwrap()
        }
    }

    fn fresh(ids: &[&str]) -> Reply {
        Ok(FetchOutcome::Fresh {
            items: ids.iter().map(|id| test_item(id, id)).collect(),
            cached: false,
            age: None,
            rate_limit: None,
        })
    }

    fn ids(state: &FeedState) -> Vec<&str> {
        state.items.iter().map(|i| i.id.as_str()).collect()
    }

    async fn answered(reply: Reply) -> ItemFeed {
        let source = Arc::new(GatedSource::default());
        source.gate().send(reply).unwrap();
        let feed = ItemFeed::new(source);
        feed.refetch().await;
        feed
    }

    #[tokio::test]
    async fn test_fresh_outcome_replaces_items() {
        let feed = answered(fresh(&["a", "b"])).await;
        let state = feed.snapshot();

        assert_eq!(ids(&state), vec!["a", "b"]);
        assert!(!state.loading);
        assert!(!state.is_stale);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_stale_outcome_keeps_items_usable() {
        let feed = answered(Ok(FetchOutcome::Stale {
            items: vec![test_item("a", "a")],
            reason: StaleReason::UpstreamError,
        }))
        .await;
        let state = feed.snapshot();

        assert_eq!(ids(&state), vec!["a"]);
        assert!(state.is_stale);
        assert_eq!(
            state.error.as_deref(),
            Some("Using stale cache due to API error")
        );
    }

    #[tokio::test]
    async fn test_error_without_items_leaves_empty_list() {
        let feed = answered(Ok(FetchOutcome::Error {
            message: "Failed to fetch items".to_string(),
            status: 502,
        }))
        .await;
        let state = feed.snapshot();

        assert!(state.items.is_empty());
        assert_eq!(state.error.as_deref(), Some("Failed to fetch items"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_items() {
        let source = Arc::new(GatedSource::default());
        source.gate().send(fresh(&["a"])).unwrap();
        source
            .gate()
            .send(Err(FeedError::Transport("connection refused".to_string())))
            .unwrap();

        let feed = ItemFeed::new(source);
        feed.refetch().await;
        feed.refetch().await;

        let state = feed.snapshot();
        assert_eq!(ids(&state), vec!["a"]);
        assert!(state.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_overlapping_calls_last_resolution_wins() {
        let source = Arc::new(GatedSource::default());
        let first = source.gate();
        let second = source.gate();
        let feed = ItemFeed::new(Arc::clone(&source) as Arc<dyn FeedSource>);
        let mut rx = feed.subscribe();

        feed.spawn_refetch();
        feed.spawn_refetch();
        while source.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        assert!(feed.snapshot().loading);

        second.send(fresh(&["second"])).unwrap();
        let state = rx
            .wait_for(|s| !s.items.is_empty())
            .await
            .unwrap()
            .clone();
        assert_eq!(ids(&state), vec!["second"]);
        assert!(state.loading, "first call is still in flight");

        first.send(fresh(&["first"])).unwrap();
        let state = rx.wait_for(|s| !s.loading).await.unwrap().clone();
        assert_eq!(ids(&state), vec!["first"]);
    }

    #[tokio::test]
    async fn test_result_after_close_is_ignored() {
        let source = Arc::new(GatedSource::default());
        let reply = source.gate();
        let feed = ItemFeed::new(Arc::clone(&source) as Arc<dyn FeedSource>);

        let task = feed.spawn_refetch();
        while source.calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        feed.close();
        let _ = reply.send(fresh(&["late"]));
        task.await.unwrap();

        assert!(feed.snapshot().items.is_empty());
        assert!(feed.is_closed());

        // Closed feeds do not start new calls either.
        feed.refetch().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_loading_transitions() {
        let source = Arc::new(GatedSource::default());
        let reply = source.gate();
        let feed = ItemFeed::new(Arc::clone(&source) as Arc<dyn FeedSource>);
        let mut rx = feed.subscribe();

        let task = feed.spawn_refetch();
        assert!(feed.snapshot().loading);

        rx.wait_for(|s| s.loading).await.unwrap();
        reply.send(fresh(&["a"])).unwrap();
        task.await.unwrap();

        let state = rx.wait_for(|s| !s.loading).await.unwrap().clone();
        assert_eq!(ids(&state), vec!["a"]);
    }
}

//! Multicast snapshot cache
//!
//! Turns a snapshot stream into a replay-1 broadcast: the upstream is polled by a single
//! forwarding task started on the first subscription, and every subscriber first receives the
//! latest snapshot without causing any new work.

use std::sync::{Arc, Mutex, PoisonError};

use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{core::Snapshot, preservation::SavedState};

type Upstream<K, V> = BoxStream<'static, Snapshot<K, V>>;

struct Shared<K, V> {
    latest: Arc<watch::Sender<Option<Snapshot<K, V>>>>,
    upstream: Mutex<Option<Upstream<K, V>>>,
    cancel: CancellationToken,
}

impl<K, V> Drop for Shared<K, V> {
    fn drop(&mut self) {
        // Last handle gone: stop forwarding, which in turn lets the engine wind down
        self.cancel.cancel();
    }
}

/// Shared, lazily started snapshot stream with a replay depth of one.
///
/// The upstream keeps running while any handle or subscription exists and `scope` is not
/// cancelled. Slow subscribers may skip intermediate snapshots but never receive an older
/// snapshot after a newer one.
pub struct CachedSnapshots<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> CachedSnapshots<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(upstream: Upstream<K, V>, scope: &CancellationToken) -> Self {
        Self::with_seed(upstream, scope, None)
    }

    pub(crate) fn with_seed(
        upstream: Upstream<K, V>,
        scope: &CancellationToken,
        seed: Option<Snapshot<K, V>>,
    ) -> Self {
        let (latest, _) = watch::channel(seed);
        Self {
            shared: Arc::new(Shared {
                latest: Arc::new(latest),
                upstream: Mutex::new(Some(upstream)),
                cancel: scope.child_token(),
            }),
        }
    }

    /// The most recent snapshot, if any was emitted yet
    pub fn latest(&self) -> Option<Snapshot<K, V>> {
        self.shared.latest.borrow().clone()
    }

    /// Attach a subscriber, starting the upstream if this is the first one.
    ///
    /// # Panics
    ///
    /// Starting the upstream spawns a task, so the first call must happen inside a tokio runtime.
    pub fn subscribe(&self) -> SnapshotSubscription<K, V> {
        let receiver = self.shared.latest.subscribe();
        self.start();
        SnapshotSubscription {
            receiver,
            cancel: self.shared.cancel.clone(),
            replayed: false,
            _cache: self.clone(),
        }
    }

    /// Wait for the first snapshot to become available
    pub async fn ready(&self) -> Option<Snapshot<K, V>> {
        self.subscribe().next().await
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.latest.receiver_count()
    }

    pub fn is_started(&self) -> bool {
        self.shared
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Pages and load states of the latest snapshot, ready to be persisted
    pub fn state_for_preservation(&self) -> Option<SavedState<K, V>>
    where
        K: Clone,
    {
        self.shared
            .latest
            .borrow()
            .as_ref()
            .map(SavedState::from_snapshot)
    }

    /// Like [`Self::state_for_preservation`], without keeping the cache alive
    pub(crate) fn preservation_supplier(
        &self,
    ) -> impl Fn() -> Option<SavedState<K, V>> + Send + Sync + 'static
    where
        K: Clone,
    {
        let shared = Arc::downgrade(&self.shared);
        move || {
            let shared = shared.upgrade()?;
            let state = shared
                .latest
                .borrow()
                .as_ref()
                .map(SavedState::from_snapshot);
            state
        }
    }

    fn start(&self) {
        let upstream = self
            .shared
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut upstream) = upstream else {
            return;
        };

        debug!("First subscriber attached, starting upstream");
        let latest = Arc::clone(&self.shared.latest);
        let cancel = self.shared.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = upstream.next() => match next {
                        Some(snapshot) => {
                            latest.send_replace(Some(snapshot));
                        }
                        None => break,
                    },
                }
            }
            debug!("Snapshot cache stopped forwarding");
        });
    }
}

impl<K, V> Clone for CachedSnapshots<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// One subscriber of a [`CachedSnapshots`].
///
/// Keeps the cache alive while it exists. Dropping it only detaches this subscriber.
pub struct SnapshotSubscription<K, V> {
    receiver: watch::Receiver<Option<Snapshot<K, V>>>,
    cancel: CancellationToken,
    replayed: bool,
    _cache: CachedSnapshots<K, V>,
}

impl<K, V> SnapshotSubscription<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// The next snapshot; the first call replays the latest one if it exists.
    ///
    /// Returns `None` once the cache's scope is cancelled.
    pub async fn next(&mut self) -> Option<Snapshot<K, V>> {
        if !self.replayed {
            self.replayed = true;
            let latest = self.receiver.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                changed = self.receiver.changed() => changed.ok()?,
            }
            let latest = self.receiver.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Snapshot<K, V>> {
        stream::unfold(self, |mut subscription| async move {
            let snapshot = subscription.next().await?;
            Some((snapshot, subscription))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        core::{LoadState, PagingConfig, PagingRequest},
        engine::pager::Pager,
        test_helpers::ScriptedSource,
    };

    fn source() -> Arc<ScriptedSource<u32, &'static str>> {
        Arc::new(
            ScriptedSource::new()
                .with_page(1, vec!["a", "b"], None, Some(2))
                .with_page(2, vec!["c", "d"], Some(1), None),
        )
    }

    async fn next(
        subscription: &mut SnapshotSubscription<u32, &'static str>,
    ) -> Snapshot<u32, &'static str> {
        timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("snapshot within timeout")
            .expect("cache still running")
    }

    #[tokio::test]
    async fn test_upstream_starts_on_first_subscription() {
        let source = source();
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source)).cached_in(&scope);

        assert!(!cache.is_started());
        assert!(cache.latest().is_none());

        let mut subscription = cache.subscribe();
        assert!(cache.is_started());
        assert_eq!(next(&mut subscription).await.generation, 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_latest_without_fetching() {
        let source = source();
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source)).cached_in(&scope);

        let mut first = cache.subscribe();
        let initial = next(&mut first).await;
        initial.bus.send(PagingRequest::Refresh).expect("bus open");
        let mut latest = next(&mut first).await;
        while latest.load_states.refresh != LoadState::Complete {
            latest = next(&mut first).await;
        }
        let calls = source.call_count();

        let mut late = cache.subscribe();
        let replayed = next(&mut late).await;

        assert_eq!(replayed.generation, latest.generation);
        assert_eq!(replayed.items().copied().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(source.call_count(), calls);
        assert_eq!(cache.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_generations_never_go_backwards() {
        let source = source();
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source)).cached_in(&scope);
        let mut subscription = cache.subscribe();

        let initial = next(&mut subscription).await;
        initial.bus.send(PagingRequest::Refresh).expect("bus open");
        initial.bus.send(PagingRequest::Append).expect("bus open");

        let mut last = initial.generation;
        loop {
            let snapshot = next(&mut subscription).await;
            assert!(snapshot.generation > last);
            last = snapshot.generation;
            if snapshot.load_states.append == LoadState::Complete {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_scope_cancellation_ends_subscriptions() {
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, source()).cached_in(&scope);
        let mut subscription = cache.subscribe();
        next(&mut subscription).await;

        scope.cancel();

        let ended = timeout(Duration::from_secs(5), subscription.next()).await;
        assert!(matches!(ended, Ok(None)));
        assert!(cache.is_cancelled());
    }

    #[tokio::test]
    async fn test_engine_stops_after_last_handle_is_dropped() {
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, source()).cached_in(&scope);
        let mut subscription = cache.subscribe();
        let bus = next(&mut subscription).await.bus;

        drop(subscription);
        drop(cache);

        timeout(Duration::from_secs(5), async {
            while !bus.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("engine stops");
    }
}

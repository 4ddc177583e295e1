//! Collecting only while a consumer is visible

use std::{fmt::Debug, sync::Arc};

use color_eyre::eyre::Result;
use strum::{Display, EnumIs};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cache::CachedSnapshots, paging_items::PagingItems};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
pub enum LifecycleState {
    Created,
    Resumed,
    Paused,
    Destroyed,
}

/// Active/inactive transitions of a host component. `Destroyed` is final.
#[derive(Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(LifecycleState::Created)),
        }
    }

    pub fn resume(&self) {
        self.transition(LifecycleState::Resumed);
    }

    pub fn pause(&self) {
        self.transition(LifecycleState::Paused);
    }

    pub fn destroy(&self) {
        self.transition(LifecycleState::Destroyed);
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn observe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LifecycleState) {
        self.state.send_if_modified(|state| {
            if state.is_destroyed() || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "Lifecycle transition");
            *state = next;
            true
        });
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive a [`PagingItems`] from `cache` while `lifecycle` is resumed.
///
/// Every resume starts a collector against the shared cache, which replays its latest
/// snapshot, so nothing is refetched just because the consumer came back. Pausing stops the
/// collector and deactivates the view, so accesses while paused neither prefetch nor start
/// the engine; a fetch already in flight still completes inside the engine. The returned task
/// ends once the lifecycle is destroyed or dropped.
pub fn bind_to_lifecycle<K, V>(
    cache: &CachedSnapshots<K, V>,
    lifecycle: &Lifecycle,
    start_immediately: bool,
) -> Result<(PagingItems<K, V>, JoinHandle<()>)>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let items = PagingItems::attach(cache, start_immediately, lifecycle.state().is_resumed())?;
    let mut states = lifecycle.observe();
    let cache = cache.clone();

    let supervisor = tokio::spawn({
        let items = items.clone();
        async move {
            loop {
                let resumed = states
                    .wait_for(|state| state.is_resumed() || state.is_destroyed())
                    .await
                    .map(|state| state.is_resumed());
                if !matches!(resumed, Ok(true)) {
                    break;
                }

                debug!("Resumed, collecting snapshots");
                items.set_active(true);
                let cancel = CancellationToken::new();
                let collector = tokio::spawn({
                    let items = items.clone();
                    let subscription = cache.subscribe();
                    let cancel = cancel.clone();
                    async move { items.collect(subscription, cancel).await }
                });

                let paused = states
                    .wait_for(|state| !state.is_resumed())
                    .await
                    .map(|state| state.is_paused());
                items.set_active(false);
                cancel.cancel();
                // Nothing may be applied once the host is inactive
                if let Err(e) = collector.await {
                    debug!("Collector ended abnormally: {e}");
                }
                if !matches!(paused, Ok(true)) {
                    break;
                }
                debug!("Paused, stopped collecting");
            }
            debug!("Lifecycle binding finished");
        }
    });

    Ok((items, supervisor))
}

//! Consumer adapter
//!
//! [`PagingItems`] mirrors the latest snapshot as a flat list and turns item accesses near
//! either edge of the loaded window into prefetch requests.

use std::{
    fmt::Debug,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use color_eyre::eyre::{bail, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::cache::{CachedSnapshots, SnapshotSubscription};
use crate::core::{
    Direction, Generation, LoadState, LoadStates, Page, PagingConfig, PagingRequest, RequestBus,
    Snapshot, UpdateKind,
};

struct ItemsState<K, V> {
    bus: Option<RequestBus<K>>,
    config: Option<PagingConfig>,
    generation: Generation,
    load_states: LoadStates,
    pages: Arc<[Page<K, V>]>,
    items: Arc<[V]>,
    last_accessed: Option<usize>,
    /// Accesses drive paging only while active
    active: bool,
    /// A start deferred until the view becomes active
    start_pending: bool,
}

impl<K: Clone + PartialEq + Debug, V> ItemsState<K, V> {
    fn edge_key(&self, direction: Direction) -> Option<K> {
        let page = match direction {
            Direction::Prepend => self.pages.first(),
            Direction::Append => self.pages.last(),
        };
        page.and_then(|page| page.edge_key(direction)).cloned()
    }

    /// Request the next page when the last access came within prefetch distance of an edge
    fn trigger_page_load(&mut self) {
        let Some(index) = self.last_accessed.filter(|_| self.active) else {
            return;
        };
        let distance = self.config.map_or(1, |config| config.prefetch_distance);
        let direction = if index < distance && self.load_states.prepend.is_not_loading() {
            Direction::Prepend
        } else if index + distance >= self.items.len() && self.load_states.append.is_not_loading() {
            Direction::Append
        } else {
            return;
        };
        let (Some(bus), Some(key)) = (&self.bus, self.edge_key(direction)) else {
            return;
        };

        debug!(%direction, ?key, index, "Prefetching");
        match bus.send(PagingRequest::Prefetch { direction, key }) {
            // Until the engine answers, further accesses must not ask again
            Ok(()) => self.load_states.set(direction, LoadState::Loading),
            Err(e) => error!(%direction, "Failed to request prefetch: {e}"),
        }
    }

    fn start(&mut self) {
        let Some(bus) = &self.bus else {
            return;
        };
        debug!("Pager has not started yet, requesting start");
        match bus.send(PagingRequest::Start) {
            // Any pages are kept on screen while the refresh runs
            Ok(()) => self.load_states = LoadStates::refreshing(),
            Err(e) => error!("Failed to request initial refresh: {e}"),
        }
    }
}

/// A list view over a paged query for rendering code.
///
/// Cloning yields another handle to the same view. The view is driven by [`Self::collect`]
/// (or [`super::lifecycle::bind_to_lifecycle`]); reads never block on the engine.
pub struct PagingItems<K, V> {
    state: Arc<Mutex<ItemsState<K, V>>>,
    changes: Arc<watch::Sender<u64>>,
    start_immediately: bool,
}

impl<K, V> PagingItems<K, V>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// An empty view that has not seen any snapshot.
    ///
    /// With `start_immediately`, the first snapshot of an engine that has not started paging
    /// makes the view send [`PagingRequest::Start`] itself. Several such views over one engine
    /// cause a single refresh.
    pub fn new(start_immediately: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ItemsState {
                bus: None,
                config: None,
                generation: 0,
                load_states: LoadStates::idle(),
                pages: Arc::from(Vec::new()),
                items: Arc::from(Vec::new()),
                last_accessed: None,
                active: true,
                start_pending: false,
            })),
            changes: Arc::new(watch::Sender::new(0)),
            start_immediately,
        }
    }

    /// A view over `cache`, showing its latest snapshot right away.
    ///
    /// Without a cached snapshot and with `start_immediately`, `refresh` reports `Loading`
    /// ahead of time so the first frame does not render an idle list.
    pub fn from_cache(cache: &CachedSnapshots<K, V>, start_immediately: bool) -> Result<Self> {
        Self::attach(cache, start_immediately, true)
    }

    /// Like [`Self::from_cache`], but starting out inactive, see [`Self::set_active`]
    pub(crate) fn attach(
        cache: &CachedSnapshots<K, V>,
        start_immediately: bool,
        active: bool,
    ) -> Result<Self> {
        let items = Self::new(start_immediately);
        items.lock().active = active;
        match cache.latest() {
            Some(snapshot) => {
                if snapshot.bus.is_closed() {
                    bail!("Cached snapshot belongs to a stopped pager");
                }
                debug!(?snapshot, "Adopting cached snapshot");
                items.apply_snapshot(snapshot);
            }
            None if start_immediately => {
                debug!("No cached snapshot, reporting refresh as loading ahead of time");
                items.lock().load_states.refresh = LoadState::Loading;
            }
            None => {}
        }
        Ok(items)
    }

    /// Feed one snapshot into the view.
    ///
    /// Snapshots from the same engine that are not newer than the last one applied are ignored.
    pub fn apply_snapshot(&self, snapshot: Snapshot<K, V>) {
        let mut state = self.lock();
        if let Some(bus) = &state.bus {
            if bus.same_bus(&snapshot.bus) && snapshot.generation <= state.generation {
                debug!(
                    generation = snapshot.generation,
                    applied = state.generation,
                    "Ignoring stale snapshot"
                );
                return;
            }
        }
        if !state.bus.as_ref().is_some_and(|bus| bus.same_bus(&snapshot.bus)) {
            debug!("Attached to a pager");
            state.bus = Some(snapshot.bus.clone());
        }
        state.config = Some(snapshot.config);
        state.generation = snapshot.generation;

        state.load_states = snapshot.load_states.clone();
        state.start_pending = false;
        if self.start_immediately && snapshot.load_states.refresh.is_not_loading() {
            if state.active {
                state.start();
            } else {
                debug!("View is inactive, deferring start");
                state.start_pending = true;
            }
        }

        if !Arc::ptr_eq(&state.pages, &snapshot.pages) {
            // Intermediate snapshots may have been skipped, so the shift of the window is
            // found from the previous first page rather than from the update kind
            let previous_first = state.pages.first().map(|page| page.key.clone());
            let shift: Option<usize> = match (&snapshot.update_kind, previous_first) {
                (UpdateKind::Refresh, _) | (_, None) => None,
                (_, Some(key)) => snapshot
                    .pages
                    .iter()
                    .position(|page| page.key == key)
                    .map(|position| snapshot.pages[..position].iter().map(Page::len).sum()),
            };

            state.items = snapshot.items().cloned().collect();
            state.pages = snapshot.pages;
            match shift {
                Some(shift) => {
                    state.last_accessed = state.last_accessed.map(|index| index + shift);
                    // Also picks up empty pages right away instead of waiting for a scroll
                    state.trigger_page_load();
                }
                None => state.last_accessed = None,
            }
        }
        drop(state);
        self.notify();
    }

    /// Apply snapshots from `subscription` until it ends or `cancel` fires
    pub async fn collect(
        &self,
        mut subscription: SnapshotSubscription<K, V>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                snapshot = subscription.next() => match snapshot {
                    Some(snapshot) => self.apply_snapshot(snapshot),
                    None => break,
                },
            }
        }
        debug!("Stopped collecting snapshots");
    }

    pub fn load_states(&self) -> LoadStates {
        self.lock().load_states.clone()
    }

    /// Every loaded item in page order. Never triggers loading.
    pub fn items(&self) -> Arc<[V]> {
        Arc::clone(&self.lock().items)
    }

    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Generation of the last applied snapshot, 0 before the first one
    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    /// The item at `index`, prefetching when `index` is close to an edge of the window
    pub fn get(&self, index: usize) -> Option<V> {
        let mut state = self.lock();
        let item = state.items.get(index).cloned()?;
        state.last_accessed = Some(index);
        let before = state.load_states.clone();
        state.trigger_page_load();
        let changed = state.load_states != before;
        drop(state);
        if changed {
            self.notify();
        }
        Some(item)
    }

    /// The item at `index`, without side effects
    pub fn peek(&self, index: usize) -> Option<V> {
        self.lock().items.get(index).cloned()
    }

    /// Reload from the initial key, unless a refresh is already running
    pub fn refresh(&self) -> Result<()> {
        let mut state = self.lock();
        if state.load_states.refresh.is_loading() {
            return Ok(());
        }
        let Some(bus) = &state.bus else {
            debug!("Refresh requested before the first snapshot, ignoring");
            return Ok(());
        };
        bus.send(PagingRequest::Refresh)?;
        state.load_states.refresh = LoadState::Loading;
        drop(state);
        self.notify();
        Ok(())
    }

    /// Repeat the failed requests; does nothing when no direction is in error
    pub fn retry(&self) -> Result<()> {
        let state = self.lock();
        let Some(bus) = &state.bus else {
            return Ok(());
        };
        let states = &state.load_states;
        if states.refresh.is_error() {
            debug!("Retrying refresh");
            return bus.send(PagingRequest::Refresh);
        }
        for direction in [Direction::Prepend, Direction::Append] {
            if states.get(direction).is_error() {
                debug!(%direction, "Retrying");
                bus.send(PagingRequest::push(direction))?;
            }
        }
        Ok(())
    }

    /// Whether accesses may drive paging.
    ///
    /// An inactive view still answers reads but never prefetches. On activation a deferred
    /// start is sent and the last accessed index is checked for prefetching again.
    pub fn set_active(&self, active: bool) {
        let mut state = self.lock();
        let activated = active && !state.active;
        state.active = active;
        if active && mem::take(&mut state.start_pending) {
            state.start();
        }
        if activated {
            state.trigger_page_load();
        }
        drop(state);
        self.notify();
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Bumped on every change of the view
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Wait until `predicate` holds for this view
    pub async fn wait_until(&self, mut predicate: impl FnMut(&Self) -> bool) {
        let mut changes = self.changes();
        while !predicate(self) {
            // The sender lives in `self`, so it cannot be dropped while we wait
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn lock(&self) -> MutexGuard<'_, ItemsState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Clone for PagingItems<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            changes: Arc::clone(&self.changes),
            start_immediately: self.start_immediately,
        }
    }
}

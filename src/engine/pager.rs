//! The paging state machine
//!
//! One [`Pager`] owns the page list and load states of one logical query. It consumes its
//! request bus one request at a time, is the only caller of its [`PagingSource`], and
//! publishes a [`Snapshot`] after every state change.

use std::{fmt::Debug, sync::Arc};

use color_eyre::eyre::{eyre, Result};
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    core::{
        Direction, LoadParams, LoadState, LoadStates, Page, PagingConfig, PagingRequest,
        PagingSource, RequestBus, Snapshot, UpdateKind,
    },
    integration::cache::CachedSnapshots,
    preservation::SavedState,
};

pub type SnapshotSink<K, V> = mpsc::UnboundedSender<Snapshot<K, V>>;

/// Engine for one paginated query
pub struct Pager<K, V, S> {
    config: PagingConfig,
    initial_key: K,
    source: S,
    pages: Arc<[Page<K, V>]>,
    load_states: LoadStates,
    generation: u64,
    bus: RequestBus<K>,
    requests: mpsc::UnboundedReceiver<PagingRequest<K>>,
    cancel: CancellationToken,
    scope: CancellationToken,
    restored: bool,
    initial_emitted: bool,
}

impl<K, V, S> Pager<K, V, S>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: PagingSource<K, V>,
{
    /// Create an engine that starts with an empty window
    pub fn new(config: PagingConfig, initial_key: K, source: S) -> Self {
        let (bus, requests) = RequestBus::channel();
        Self {
            config,
            initial_key,
            source,
            pages: Arc::from(Vec::new()),
            load_states: LoadStates::default(),
            generation: 0,
            bus,
            requests,
            cancel: CancellationToken::new(),
            scope: CancellationToken::new(),
            restored: false,
            initial_emitted: false,
        }
    }

    /// Seed the window with state saved by a previous engine.
    ///
    /// Load states are sanitized first: a fetch that was in flight when the state was saved
    /// never completed, so it must not come back as `Loading`.
    #[must_use]
    pub fn with_initial_state(mut self, state: SavedState<K, V>) -> Self {
        let state = state.sanitize();
        debug!(
            pages = state.pages.len(),
            load_states = ?state.load_states,
            "Restoring pager state"
        );
        self.pages = Arc::from(state.pages);
        self.load_states = state.load_states;
        self.restored = true;
        self
    }

    /// Stop the engine when `token` is cancelled.
    ///
    /// Cancellation is observed only between requests; a fetch in flight always completes.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn bus(&self) -> RequestBus<K> {
        self.bus.clone()
    }

    pub fn config(&self) -> PagingConfig {
        self.config
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Run the engine until cancelled or until every snapshot consumer is gone
    pub async fn run(mut self, sink: SnapshotSink<K, V>) {
        if !self.initial_emitted {
            let snapshot = self.initial_snapshot();
            if sink.send(snapshot).is_err() {
                return;
            }
        }

        loop {
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("Pager cancelled");
                    break;
                }
                () = self.scope.cancelled() => {
                    debug!("Pager scope cancelled");
                    break;
                }
                () = sink.closed() => {
                    debug!("Every snapshot consumer is gone, stopping pager");
                    break;
                }
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            if let Err(e) = self.handle(request, &sink).await {
                debug!("Stopping pager: {e}");
                break;
            }
        }
    }

    /// A lazily started stream of this engine's snapshots.
    ///
    /// The engine is spawned on the first poll and stops once the stream is dropped.
    pub fn into_stream(self) -> BoxStream<'static, Snapshot<K, V>> {
        stream::unfold(Launch::Pending(self), |launch| async move {
            let mut rx = match launch {
                Launch::Pending(pager) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tokio::spawn(pager.run(tx));
                    rx
                }
                Launch::Running(rx) => rx,
            };
            let snapshot = rx.recv().await?;
            Some((snapshot, Launch::Running(rx)))
        })
        .boxed()
    }

    /// Share this engine between any number of consumers for as long as `scope` lives.
    ///
    /// A restored engine's first snapshot is placed in the cache right away, so consumers
    /// created before the engine starts see the restored window synchronously. A token given
    /// to [`Self::with_cancellation`] still stops the engine, whichever fires first.
    pub fn cached_in(mut self, scope: &CancellationToken) -> CachedSnapshots<K, V> {
        self.scope = scope.child_token();
        let seed = if self.restored {
            Some(self.initial_snapshot())
        } else {
            None
        };
        CachedSnapshots::with_seed(self.into_stream(), scope, seed)
    }

    pub(crate) fn initial_snapshot(&mut self) -> Snapshot<K, V> {
        self.initial_emitted = true;
        // A restored window looks as if it was just refreshed
        let update_kind = if self.restored && !self.pages.is_empty() {
            UpdateKind::Refresh
        } else {
            UpdateKind::StateChange
        };
        self.snapshot(update_kind)
    }

    fn snapshot(&mut self, update_kind: UpdateKind) -> Snapshot<K, V> {
        self.generation += 1;
        Snapshot {
            pages: Arc::clone(&self.pages),
            update_kind,
            config: self.config,
            load_states: self.load_states.clone(),
            generation: self.generation,
            bus: self.bus.clone(),
        }
    }

    fn emit(&mut self, sink: &SnapshotSink<K, V>, update_kind: UpdateKind) -> Result<()> {
        let snapshot = self.snapshot(update_kind);
        debug!(?snapshot, "Emitting snapshot");
        sink.send(snapshot)
            .map_err(|_| eyre!("Snapshot consumer is gone"))
    }

    async fn handle(&mut self, request: PagingRequest<K>, sink: &SnapshotSink<K, V>) -> Result<()> {
        debug!(?request, generation = self.generation, "Handling paging request");
        match request {
            PagingRequest::Refresh => self.refresh(sink).await,
            PagingRequest::Start if self.load_states.refresh.is_not_loading() => {
                self.refresh(sink).await
            }
            PagingRequest::Start => {
                debug!(
                    refresh = ?self.load_states.refresh,
                    "Already started, ignoring start request"
                );
                Ok(())
            }
            PagingRequest::Append => self.push(Direction::Append, None, sink).await,
            PagingRequest::Prepend => self.push(Direction::Prepend, None, sink).await,
            PagingRequest::Prefetch { direction, key } => {
                self.push(direction, Some(key), sink).await
            }
        }
    }

    async fn refresh(&mut self, sink: &SnapshotSink<K, V>) -> Result<()> {
        // Pages are kept while refreshing so consumers don't flash an empty list
        self.load_states = LoadStates::refreshing();
        self.emit(sink, UpdateKind::StateChange)?;

        let params = LoadParams {
            key: self.initial_key.clone(),
            requested_size: self.config.initial_load_size,
        };
        match self.source.load(params).await {
            Ok(loaded) => {
                let page = Page::from_loaded(self.initial_key.clone(), loaded);
                self.load_states = LoadStates::new(
                    LoadState::not_loading(page.prev_key.is_none()),
                    LoadState::not_loading(page.next_key.is_none()),
                    LoadState::Complete,
                );
                self.pages = Arc::from(vec![page]);
                self.emit(sink, UpdateKind::Refresh)
            }
            Err(e) => {
                error!("Refresh failed: {e}");
                self.load_states =
                    LoadStates::new(LoadState::Idle, LoadState::Idle, LoadState::Error(e.into()));
                self.emit(sink, UpdateKind::StateChange)
            }
        }
    }

    async fn push(
        &mut self,
        direction: Direction,
        expected_key: Option<K>,
        sink: &SnapshotSink<K, V>,
    ) -> Result<()> {
        let Some(key) = self.edge_key(direction) else {
            debug!(%direction, "Nothing to load at this edge, ignoring request");
            return Ok(());
        };

        let state = self.load_states.get(direction);
        if state.is_idle() {
            warn!(%direction, "Window is not initialized, ignoring request");
            return Ok(());
        }
        if let Some(expected_key) = expected_key {
            if expected_key != key {
                warn!(
                    %direction,
                    ?expected_key,
                    ?key,
                    "Ignoring stale prefetch request"
                );
                return Ok(());
            }
            if state.is_error() {
                // Prefetching must not hammer a failing endpoint; retry is explicit
                warn!(%direction, "Ignoring prefetch request without retry: {state:?}");
                return Ok(());
            }
        }

        self.load_states.set(direction, LoadState::Loading);
        self.emit(sink, UpdateKind::StateChange)?;

        let params = LoadParams {
            key: key.clone(),
            requested_size: self.config.page_size,
        };
        match self.source.load(params).await {
            Ok(loaded) => {
                let page = Page::from_loaded(key, loaded);
                let end_of_pagination = page.edge_key(direction).is_none();

                let mut pages = Vec::with_capacity(self.pages.len() + 1);
                let update_kind = match direction {
                    Direction::Append => {
                        pages.extend(self.pages.iter().cloned());
                        pages.push(page);
                        UpdateKind::DataChange {
                            appended: 1,
                            prepended: 0,
                        }
                    }
                    Direction::Prepend => {
                        pages.push(page);
                        pages.extend(self.pages.iter().cloned());
                        UpdateKind::DataChange {
                            appended: 0,
                            prepended: 1,
                        }
                    }
                };
                self.pages = Arc::from(pages);
                self.load_states
                    .set(direction, LoadState::not_loading(end_of_pagination));
                self.emit(sink, update_kind)
            }
            Err(e) => {
                error!(%direction, "Paging source failed: {e}");
                self.load_states.set(direction, LoadState::Error(e.into()));
                self.emit(sink, UpdateKind::StateChange)
            }
        }
    }

    fn edge_key(&self, direction: Direction) -> Option<K> {
        let page = match direction {
            Direction::Prepend => self.pages.first(),
            Direction::Append => self.pages.last(),
        };
        page.and_then(|page| page.edge_key(direction)).cloned()
    }
}

enum Launch<P, R> {
    Pending(P),
    Running(R),
}

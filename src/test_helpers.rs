use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use color_eyre::eyre::{eyre, Result};
use tokio::{
    sync::{watch, Semaphore},
    time::sleep,
};

use crate::core::{LoadParams, LoadedPage, PagingSource};

struct ScriptedPage<K, V> {
    data: Vec<V>,
    prev_key: Option<K>,
    next_key: Option<K>,
}

/// Paging source serving a fixed set of pages, for tests.
/// Records every load, can fail selected keys and can hold loads open on a gate.
pub struct ScriptedSource<K, V> {
    pages: HashMap<K, ScriptedPage<K, V>>,
    failures: Mutex<HashMap<K, usize>>,
    calls: Mutex<Vec<LoadParams<K>>>,
    call_count: watch::Sender<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
}

impl<K, V> ScriptedSource<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_count: watch::Sender::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: None,
            gate: None,
        }
    }

    pub fn with_page(
        mut self,
        key: K,
        data: Vec<V>,
        prev_key: Option<K>,
        next_key: Option<K>,
    ) -> Self {
        self.pages.insert(
            key,
            ScriptedPage {
                data,
                prev_key,
                next_key,
            },
        );
        self
    }

    /// Every load sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every load waits for a permit handed out by [`Self::release`]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, loads: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(loads);
        }
    }

    /// Fail the next `count` loads of `key`
    pub fn fail_next(&self, key: K, count: usize) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, count);
    }

    /// Wait until at least `count` loads have started
    pub async fn wait_for_calls(&self, count: usize) {
        let mut calls = self.call_count.subscribe();
        // The sender lives in `self`, so the wait cannot fail while we borrow it
        let _ = calls.wait_for(|started| *started >= count).await;
    }

    pub fn calls(&self) -> Vec<LoadParams<K>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, key: &K) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|params| &params.key == key)
            .count()
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.borrow()
    }

    /// Highest number of loads that were running at the same time
    pub fn max_concurrent_loads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self, key: &K) -> bool {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl<K, V> Default for ScriptedSource<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PagingSource<K, V> for ScriptedSource<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn load(&self, params: LoadParams<K>) -> Result<LoadedPage<K, V>> {
        let key = params.key.clone();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params);
        self.call_count.send_modify(|count| *count += 1);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.take_failure(&key) {
            return Err(eyre!("Scripted failure for page {key:?}"));
        }
        let page = self
            .pages
            .get(&key)
            .ok_or_else(|| eyre!("No page scripted for key {key:?}"))?;
        Ok(LoadedPage::new(
            page.data.clone(),
            page.prev_key.clone(),
            page.next_key.clone(),
        ))
    }
}

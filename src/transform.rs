//! Snapshot transformations
//!
//! Pure functions deriving one snapshot from another without involving the engine. Page
//! boundaries, load states, update kind and generation pass through unchanged.

use std::sync::Arc;

use futures::{stream::BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{Page, Snapshot},
    integration::cache::CachedSnapshots,
};

impl<K: Clone, V> Snapshot<K, V> {
    /// Replace the items of every page by `block(items)`
    pub fn transform<R>(self, mut block: impl FnMut(&[V]) -> Vec<R>) -> Snapshot<K, R> {
        let pages: Vec<Page<K, R>> = self
            .pages
            .iter()
            .map(|page| page.with_data(block(page.items())))
            .collect();
        Snapshot {
            pages: Arc::from(pages),
            update_kind: self.update_kind,
            config: self.config,
            load_states: self.load_states,
            generation: self.generation,
            bus: self.bus,
        }
    }

    pub fn map<R>(self, mut f: impl FnMut(&V) -> R) -> Snapshot<K, R> {
        self.transform(|items| items.iter().map(&mut f).collect())
    }

    pub fn filter(self, mut predicate: impl FnMut(&V) -> bool) -> Snapshot<K, V>
    where
        V: Clone,
    {
        self.transform(|items| items.iter().filter(|item| predicate(item)).cloned().collect())
    }

    /// Reconcile the items that meet at page seams.
    ///
    /// For every pair of adjacent non-empty pages, left to right, `block` receives the last
    /// item of the earlier page and the first item of the later one and returns their
    /// replacements; `None` removes the item. Empty pages are skipped but kept, so the page
    /// count never changes. A page emptied by a removal no longer takes part in later seams.
    pub fn apply_page_boundary(
        self,
        mut block: impl FnMut(&V, &V) -> (Option<V>, Option<V>),
    ) -> Snapshot<K, V>
    where
        V: Clone,
    {
        let mut lists: Vec<Vec<V>> = self.pages.iter().map(|page| page.items().to_vec()).collect();

        for index in 1..lists.len() {
            if lists[index].is_empty() {
                continue;
            }
            let (head, tail) = lists.split_at_mut(index);
            let Some(previous) = head.iter_mut().rev().find(|list| !list.is_empty()) else {
                continue;
            };
            let current = &mut tail[0];

            let last = previous.len() - 1;
            let (replace_previous, replace_current) = block(&previous[last], &current[0]);
            match replace_previous {
                Some(item) => previous[last] = item,
                None => {
                    previous.pop();
                }
            }
            match replace_current {
                Some(item) => current[0] = item,
                None => {
                    current.remove(0);
                }
            }
        }

        debug_assert_eq!(lists.len(), self.pages.len());
        let pages: Vec<Page<K, V>> = self
            .pages
            .iter()
            .zip(lists)
            .map(|(page, list)| page.with_data(list))
            .collect();
        Snapshot {
            pages: Arc::from(pages),
            ..self
        }
    }
}

/// Transformations and caching for streams of snapshots
pub trait SnapshotStreamExt<K, V>: Stream<Item = Snapshot<K, V>> + Sized + Send + 'static
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn map_items<R, F>(self, mut f: F) -> BoxStream<'static, Snapshot<K, R>>
    where
        R: Send + Sync + 'static,
        F: FnMut(&V) -> R + Send + 'static,
    {
        self.map(move |snapshot| snapshot.map(&mut f)).boxed()
    }

    fn filter_items<F>(self, mut predicate: F) -> BoxStream<'static, Snapshot<K, V>>
    where
        V: Clone,
        F: FnMut(&V) -> bool + Send + 'static,
    {
        self.map(move |snapshot| snapshot.filter(&mut predicate)).boxed()
    }

    fn apply_page_boundary<F>(self, mut block: F) -> BoxStream<'static, Snapshot<K, V>>
    where
        V: Clone,
        F: FnMut(&V, &V) -> (Option<V>, Option<V>) + Send + 'static,
    {
        self.map(move |snapshot| snapshot.apply_page_boundary(&mut block))
            .boxed()
    }

    /// Share this stream between consumers for as long as `scope` lives
    fn cached_in(self, scope: &CancellationToken) -> CachedSnapshots<K, V> {
        CachedSnapshots::new(self.boxed(), scope)
    }
}

impl<K, V, S> SnapshotStreamExt<K, V> for S
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: Stream<Item = Snapshot<K, V>> + Sized + Send + 'static,
{
}

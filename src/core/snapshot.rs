//! Immutable, versioned views of the loaded window

use std::{fmt, sync::Arc};

use super::{
    config::PagingConfig,
    load_state::LoadStates,
    page::Page,
    request::{Direction, RequestBus},
};

/// Position of a snapshot in the emission order of its engine, starting at 1
pub type Generation = u64;

/// What produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// The page list was replaced
    Refresh,
    /// Pages were added at the edges of the window
    DataChange { appended: usize, prepended: usize },
    /// Only load states changed
    StateChange,
}

/// A view of every loaded page and the load states at one point in time.
///
/// `generation` grows by exactly one with every emission of one engine, so consumers can
/// recognise stale snapshots. Further requests go through `bus`.
pub struct Snapshot<K, V> {
    pub pages: Arc<[Page<K, V>]>,
    pub update_kind: UpdateKind,
    pub config: PagingConfig,
    pub load_states: LoadStates,
    pub generation: Generation,
    pub bus: RequestBus<K>,
}

impl<K, V> Snapshot<K, V> {
    /// All loaded items, in page order
    pub fn items(&self) -> impl Iterator<Item = &V> + '_ {
        self.pages.iter().flat_map(|page| page.items().iter())
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    pub fn first_page(&self) -> Option<&Page<K, V>> {
        self.pages.first()
    }

    pub fn last_page(&self) -> Option<&Page<K, V>> {
        self.pages.last()
    }

    /// Key of the next page to load in `direction`, `None` at the end of pagination
    pub fn edge_key(&self, direction: Direction) -> Option<&K> {
        let page = match direction {
            Direction::Prepend => self.first_page(),
            Direction::Append => self.last_page(),
        };
        page.and_then(|page| page.edge_key(direction))
    }

    /// Whether `other` was emitted by the same engine
    pub fn same_source(&self, other: &Self) -> bool {
        self.bus.same_bus(&other.bus)
    }
}

impl<K, V> Clone for Snapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            pages: Arc::clone(&self.pages),
            update_kind: self.update_kind,
            config: self.config,
            load_states: self.load_states.clone(),
            generation: self.generation,
            bus: self.bus.clone(),
        }
    }
}

// Items are left out, page sizes are enough to follow the window in logs.
impl<K: fmt::Debug, V> fmt::Debug for Snapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pages: Vec<_> = self
            .pages
            .iter()
            .map(|page| (&page.key, page.len()))
            .collect();
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("update_kind", &self.update_kind)
            .field("load_states", &self.load_states)
            .field("pages", &pages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot() -> Snapshot<u32, &'static str> {
        let (bus, _rx) = RequestBus::channel();
        Snapshot {
            pages: Arc::from(vec![
                Page::new(1, None, Some(2), vec!["a", "b"]),
                Page::new(2, Some(1), Some(3), vec!["c"]),
            ]),
            update_kind: UpdateKind::DataChange {
                appended: 1,
                prepended: 0,
            },
            config: PagingConfig::new(2),
            load_states: LoadStates::default(),
            generation: 4,
            bus,
        }
    }

    #[test]
    fn test_items_are_flattened_in_page_order() {
        let snapshot = snapshot();
        assert_eq!(snapshot.items().copied().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(snapshot.item_count(), 3);
    }

    #[test]
    fn test_edge_keys() {
        let snapshot = snapshot();
        assert_eq!(snapshot.edge_key(Direction::Prepend), None);
        assert_eq!(snapshot.edge_key(Direction::Append), Some(&3));
    }

    #[test]
    fn test_clone_shares_pages_and_bus() {
        let snapshot = snapshot();
        let cloned = snapshot.clone();
        assert!(Arc::ptr_eq(&snapshot.pages, &cloned.pages));
        assert!(snapshot.same_source(&cloned));
        assert_eq!(cloned.generation, 4);
    }

    #[test]
    fn test_debug_omits_items() {
        let rendered = format!("{:?}", snapshot());
        assert!(rendered.contains("generation: 4"));
        assert!(!rendered.contains("\"a\""));
    }
}

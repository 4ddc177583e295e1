//! One fetched unit of items

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{request::Direction, source::LoadedPage};

/// A page with the key it was loaded by and the keys of its neighbours.
///
/// A missing neighbour key means pagination ends in that direction.
/// Pages are immutable; the item slice is shared between every snapshot that contains the page.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<K, V> {
    pub key: K,
    pub prev_key: Option<K>,
    pub next_key: Option<K>,
    pub data: Arc<[V]>,
}

impl<K, V> Page<K, V> {
    pub fn new(key: K, prev_key: Option<K>, next_key: Option<K>, data: impl Into<Arc<[V]>>) -> Self {
        Self {
            key,
            prev_key,
            next_key,
            data: data.into(),
        }
    }

    /// Build a page from a successful load of `key`
    pub fn from_loaded(key: K, loaded: LoadedPage<K, V>) -> Self {
        Self::new(key, loaded.prev_key, loaded.next_key, loaded.data)
    }

    /// Key of the neighbouring page in `direction`, if any
    pub fn edge_key(&self, direction: Direction) -> Option<&K> {
        match direction {
            Direction::Prepend => self.prev_key.as_ref(),
            Direction::Append => self.next_key.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn items(&self) -> &[V] {
        &self.data
    }

    /// Same boundaries, different items
    pub fn with_data<R>(&self, data: impl Into<Arc<[R]>>) -> Page<K, R>
    where
        K: Clone,
    {
        Page::new(
            self.key.clone(),
            self.prev_key.clone(),
            self.next_key.clone(),
            data,
        )
    }
}

// Manual impl: cloning shares the item slice, so `V` need not be `Clone`.
impl<K: Clone, V> Clone for Page<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            prev_key: self.prev_key.clone(),
            next_key: self.next_key.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_from_loaded() {
        let page = Page::from_loaded(2, LoadedPage::new(vec!["c", "d"], Some(1), None));
        assert_eq!(page.key, 2);
        assert_eq!(page.edge_key(Direction::Prepend), Some(&1));
        assert_eq!(page.edge_key(Direction::Append), None);
        assert_eq!(page.items(), &["c", "d"]);
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_clone_shares_items() {
        let page = Page::new(1, None, Some(2), vec![String::from("a")]);
        let cloned = page.clone();
        assert!(Arc::ptr_eq(&page.data, &cloned.data));
    }

    #[test]
    fn test_with_data_keeps_boundaries() {
        let page = Page::new(3, Some(2), Some(4), vec![1, 2, 3]);
        let doubled = page.with_data(page.items().iter().map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(doubled, Page::new(3, Some(2), Some(4), vec![2, 4, 6]));
    }
}

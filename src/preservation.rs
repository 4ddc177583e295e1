//! Surviving process restarts
//!
//! A [`SavedState`] captures the pages and load states of a snapshot in a serde-friendly
//! form. Restoring it seeds a new engine, which re-publishes the window without fetching.

pub mod state_keeper;

pub use state_keeper::StateKeeper;

use color_eyre::eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::core::{Direction, LoadState, LoadStates, Page, Snapshot};

/// The persistable part of a snapshot
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState<K, V> {
    pub pages: Vec<Page<K, V>>,
    pub load_states: LoadStates,
}

impl<K, V> SavedState<K, V> {
    pub fn new(pages: Vec<Page<K, V>>, load_states: LoadStates) -> Self {
        Self { pages, load_states }
    }

    pub fn from_snapshot(snapshot: &Snapshot<K, V>) -> Self
    where
        K: Clone,
    {
        Self::new(snapshot.pages.to_vec(), snapshot.load_states.clone())
    }

    /// Normalize load states a restarted engine cannot honour; see [`LoadStates::sanitize`]
    #[must_use]
    pub fn sanitize(mut self) -> Self {
        self.load_states = self.load_states.sanitize(&self.pages);
        self
    }

    pub fn is_sanitized(&self) -> bool {
        let states = &self.load_states;
        !states.refresh.is_idle()
            && !states.refresh.is_loading()
            && !states.append.is_loading()
            && !states.prepend.is_loading()
    }

    pub fn to_json(&self) -> Result<String>
    where
        K: Serialize,
        V: Serialize,
    {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        Ok(serde_json::from_str(json)?)
    }
}

impl<K: Clone, V> Clone for SavedState<K, V> {
    fn clone(&self) -> Self {
        Self::new(self.pages.clone(), self.load_states.clone())
    }
}

impl LoadStates {
    /// Load states as a restarted engine should start with them.
    ///
    /// Nothing is in flight after a restart:
    /// - `refresh` that was `Loading` or never observed (`Idle`) becomes `NotLoading`
    /// - `append`/`prepend` that were `Loading` become `NotLoading`, or `Complete` when the
    ///   restored pages have no key in that direction, or `Idle` when no page was restored
    ///
    /// Errors are kept so consumers can still offer a retry.
    #[must_use]
    pub fn sanitize<K, V>(self, pages: &[Page<K, V>]) -> Self {
        let refresh = match self.refresh {
            LoadState::Loading | LoadState::Idle => LoadState::NotLoading,
            state => state,
        };
        let settle = |direction: Direction, state: LoadState| {
            if !state.is_loading() {
                return state;
            }
            let edge = match direction {
                Direction::Prepend => pages.first(),
                Direction::Append => pages.last(),
            };
            match edge {
                Some(page) => LoadState::not_loading(page.edge_key(direction).is_none()),
                None => LoadState::Idle,
            }
        };
        Self::new(
            settle(Direction::Prepend, self.prepend),
            settle(Direction::Append, self.append),
            refresh,
        )
    }
}

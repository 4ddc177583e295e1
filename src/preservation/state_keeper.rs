use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use color_eyre::eyre::{Result, WrapErr};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::SavedState;
use crate::integration::cache::CachedSnapshots;

type Supplier = Box<dyn Fn() -> Result<Option<Value>> + Send + Sync>;

/// Registry of state to carry across a restart.
///
/// Components register a supplier under a unique key; [`StateKeeper::save`] collects every
/// supplier into one JSON document. After a restart, [`StateKeeper::from_json`] loads that
/// document and each entry can be consumed once.
#[derive(Default)]
pub struct StateKeeper {
    suppliers: Mutex<BTreeMap<String, Supplier>>,
    restored: Mutex<HashMap<String, Value>>,
}

impl StateKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let restored: HashMap<String, Value> =
            serde_json::from_str(json).wrap_err("Saved state is not a JSON object")?;
        debug!(entries = restored.len(), "Loaded saved state");
        Ok(Self {
            suppliers: Mutex::default(),
            restored: Mutex::new(restored),
        })
    }

    /// Register `supplier` under `key`, replacing any earlier supplier of that key
    pub fn register<T, F>(&self, key: impl Into<String>, supplier: F)
    where
        T: Serialize,
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        let key = key.into();
        let supplier: Supplier = Box::new(move || {
            supplier()
                .map(serde_json::to_value)
                .transpose()
                .map_err(Into::into)
        });
        if self.suppliers().insert(key.clone(), supplier).is_some() {
            warn!(%key, "Replacing a registered state supplier");
        }
    }

    /// Save the latest snapshot of `cache` under `key`.
    ///
    /// The registration does not keep the cache alive; once it is gone nothing is saved.
    pub fn register_paging_state<K, V>(&self, key: impl Into<String>, cache: &CachedSnapshots<K, V>)
    where
        K: Clone + Serialize + Send + Sync + 'static,
        V: Serialize + Send + Sync + 'static,
    {
        self.register(key, cache.preservation_supplier());
    }

    pub fn unregister(&self, key: &str) {
        self.suppliers().remove(key);
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.suppliers().contains_key(key)
    }

    /// Take the restored entry of `key`; later calls return `None`
    pub fn consume<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = self
            .restored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        value
            .map(|value| {
                serde_json::from_value(value)
                    .wrap_err_with(|| format!("Saved state of {key} has an unexpected shape"))
            })
            .transpose()
    }

    /// Take the restored paging state of `key`, ready to seed an engine
    pub fn consume_paging_state<K, V>(&self, key: &str) -> Result<Option<SavedState<K, V>>>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        Ok(self
            .consume::<SavedState<K, V>>(key)?
            .map(SavedState::sanitize))
    }

    /// Collect the current state of every registered supplier into one JSON document
    pub fn save(&self) -> Result<String> {
        let mut document = serde_json::Map::new();
        for (key, supplier) in self.suppliers().iter() {
            match supplier().wrap_err_with(|| format!("Failed to save state of {key}"))? {
                Some(value) => {
                    document.insert(key.clone(), value);
                }
                None => debug!(%key, "Nothing to save"),
            }
        }
        Ok(serde_json::to_string(&document)?)
    }

    fn suppliers(&self) -> MutexGuard<'_, BTreeMap<String, Supplier>> {
        self.suppliers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        core::{LoadState, LoadStates, Page, PagingConfig, PagingRequest},
        engine::pager::Pager,
        test_helpers::ScriptedSource,
    };

    #[test]
    fn test_consume_is_one_shot() -> Result<()> {
        let keeper = StateKeeper::new();
        keeper.register("answer", || Some(42));
        let restored = StateKeeper::from_json(&keeper.save()?)?;

        assert_eq!(restored.consume::<u32>("answer")?, Some(42));
        assert_eq!(restored.consume::<u32>("answer")?, None);
        assert_eq!(restored.consume::<u32>("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_unregistered_suppliers_are_not_saved() -> Result<()> {
        let keeper = StateKeeper::new();
        keeper.register("kept", || Some("a"));
        keeper.register("dropped", || Some("b"));
        keeper.register("empty", || None::<String>);
        keeper.unregister("dropped");

        assert!(!keeper.is_registered("dropped"));
        assert_eq!(keeper.save()?, r#"{"kept":"a"}"#);
        Ok(())
    }

    #[test]
    fn test_consume_rejects_unexpected_shape() -> Result<()> {
        let keeper = StateKeeper::from_json(r#"{"pages":"nope"}"#)?;
        assert!(keeper.consume_paging_state::<u32, String>("pages").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_paging_state_survives_restart() -> Result<()> {
        let source = Arc::new(
            ScriptedSource::new()
                .with_page(1, vec!["a".to_owned(), "b".to_owned()], None, Some(2))
                .with_page(2, vec!["c".to_owned()], Some(1), None),
        );
        let scope = CancellationToken::new();
        let cache = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source)).cached_in(&scope);
        let keeper = StateKeeper::new();
        keeper.register_paging_state("feed", &cache);

        let mut subscription = cache.subscribe();
        if let Some(initial) = subscription.next().await {
            initial.bus.send(PagingRequest::Refresh)?;
        }
        while let Some(snapshot) = subscription.next().await {
            if snapshot.load_states.refresh == LoadState::Complete {
                break;
            }
        }
        let saved = keeper.save()?;

        let restarted = StateKeeper::from_json(&saved)?;
        let state = restarted
            .consume_paging_state::<u32, String>("feed")?
            .unwrap_or_else(|| panic!("feed was saved"));
        assert_eq!(
            state.pages,
            [Page::new(1, None, Some(2), vec!["a".to_owned(), "b".to_owned()])]
        );
        assert_eq!(
            state.load_states,
            LoadStates::new(LoadState::Complete, LoadState::NotLoading, LoadState::Complete)
        );

        let restored = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source))
            .with_initial_state(state)
            .cached_in(&scope);
        let items: Option<Vec<String>> = restored
            .latest()
            .map(|snapshot| snapshot.items().cloned().collect());
        assert_eq!(items, Some(vec!["a".to_owned(), "b".to_owned()]));
        assert_eq!(source.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_cache_is_not_kept_alive() -> Result<()> {
        let scope = CancellationToken::new();
        let cache = Pager::new(
            PagingConfig::new(2),
            1,
            Arc::new(ScriptedSource::<u32, String>::new()),
        )
        .cached_in(&scope);
        let keeper = StateKeeper::new();
        keeper.register_paging_state("feed", &cache);

        drop(cache);

        assert_eq!(keeper.save()?, "{}");
        Ok(())
    }
}

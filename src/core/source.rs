//! The data source contract

use std::{future::Future, sync::Arc};

use color_eyre::eyre::Result;

/// Parameters of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadParams<K> {
    pub key: K,
    pub requested_size: usize,
}

/// A successfully fetched page with the keys of its neighbours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage<K, V> {
    pub data: Vec<V>,
    pub prev_key: Option<K>,
    pub next_key: Option<K>,
}

impl<K, V> LoadedPage<K, V> {
    pub fn new(data: Vec<V>, prev_key: Option<K>, next_key: Option<K>) -> Self {
        Self {
            data,
            prev_key,
            next_key,
        }
    }
}

/// Fetches one page at a time by key.
///
/// The engine never calls `load` concurrently with itself, but several engines over the same
/// source may. Retries, backoff and timeouts belong here, not in the engine. Implementors
/// may write `async fn load`.
pub trait PagingSource<K, V>: Send + Sync + 'static {
    fn load(&self, params: LoadParams<K>) -> impl Future<Output = Result<LoadedPage<K, V>>> + Send;
}

impl<K, V, S> PagingSource<K, V> for Arc<S>
where
    S: PagingSource<K, V>,
{
    fn load(&self, params: LoadParams<K>) -> impl Future<Output = Result<LoadedPage<K, V>>> + Send {
        (**self).load(params)
    }
}

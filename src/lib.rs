//! # Pagewise - incremental, bidirectional pagination
//!
//! Loads a large remote list page by page in both directions while a consumer scrolls
//! through it.
//!
//! ## Architecture Overview
//!
//! - **Engine** (`engine`): one serialized state machine per query. It is the only caller of
//!   its [`PagingSource`] and publishes an immutable [`Snapshot`] after every state change.
//! - **Requests** (`core::request`): consumers talk to the engine through a multi-producer
//!   [`RequestBus`]; requests are handled one at a time in arrival order.
//! - **Transformations** (`transform`): pure functions deriving snapshots from snapshots.
//! - **Cache** (`integration::cache`): a lazily started, replay-1 broadcast of one engine.
//! - **Adapter** (`integration::paging_items`): a flat list view that prefetches near edges.
//! - **Preservation** (`preservation`): saving and restoring the loaded window.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pagewise::{
//!     test_helpers::ScriptedSource, LoadState, Pager, PagingConfig, PagingItems,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> pagewise::Result<()> {
//! let source = ScriptedSource::new()
//!     .with_page(1, vec!["a", "b"], None, Some(2))
//!     .with_page(2, vec!["c", "d"], Some(1), None);
//! let scope = CancellationToken::new();
//! let cache = Pager::new(PagingConfig::new(2), 1, Arc::new(source)).cached_in(&scope);
//!
//! let items = PagingItems::from_cache(&cache, true)?;
//! tokio::spawn({
//!     let items = items.clone();
//!     let subscription = cache.subscribe();
//!     let scope = scope.clone();
//!     async move { items.collect(subscription, scope).await }
//! });
//!
//! items.wait_until(|items| items.load_states().refresh == LoadState::Complete).await;
//! assert_eq!(items.get(1).as_deref(), Some("b")); // near the end, requests page 2
//! items.wait_until(|items| items.size() == 4).await;
//! assert_eq!(items.items().as_ref(), ["a", "b", "c", "d"]);
//! scope.cancel();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod engine;
pub mod infrastructure;
pub mod integration;
pub mod preservation;
pub mod test_helpers;
pub mod transform;
pub mod utils;

// Re-exports for convenience
pub use crate::core::{
    Direction, Generation, LoadError, LoadParams, LoadState, LoadStates, LoadedPage, Page,
    PagingConfig, PagingRequest, PagingSource, RequestBus, Snapshot, UpdateKind,
};
pub use engine::Pager;
pub use integration::{
    bind_to_lifecycle, CachedSnapshots, Lifecycle, LifecycleState, PagingItems,
    SnapshotSubscription,
};
pub use preservation::{SavedState, StateKeeper};
pub use transform::SnapshotStreamExt;

/// Result type used throughout the library
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

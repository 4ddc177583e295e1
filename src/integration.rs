//! Glue between the engine and its consumers
//!
//! - Sharing one engine between consumers (`cache`)
//! - Presenting snapshots as an indexable list that drives paging (`paging_items`)
//! - Collecting only while a consumer is visible (`lifecycle`)

pub mod cache;
pub mod lifecycle;
pub mod paging_items;

pub use cache::{CachedSnapshots, SnapshotSubscription};
pub use lifecycle::{bind_to_lifecycle, Lifecycle, LifecycleState};
pub use paging_items::PagingItems;

//! The paging engine
//!
//! One state machine per logical query. It serializes every request coming in over its bus and
//! publishes snapshots of the loaded window.

pub mod pager;

pub use pager::{Pager, SnapshotSink};

//! Core data model
//!
//! Value types shared by the engine, the transformation layer and consumers:
//! - Load states of the three directions
//! - Pages and snapshots of the loaded window
//! - Requests and the bus carrying them
//! - The paging source contract and configuration

pub mod config;
pub mod load_state;
pub mod page;
pub mod request;
pub mod snapshot;
pub mod source;

pub use config::PagingConfig;
pub use load_state::{LoadError, LoadState, LoadStates};
pub use page::Page;
pub use request::{Direction, PagingRequest, RequestBus};
pub use snapshot::{Generation, Snapshot, UpdateKind};
pub use source::{LoadParams, LoadedPage, PagingSource};

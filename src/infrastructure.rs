//! Infrastructure of the demo binary
//!
//! - CLI argument processing
//! - Layered settings
//! - An in-memory paging source

pub mod cli;
pub mod config;
pub mod memory_source;

//! Buffer management for Arbor relations.
//!
//! This crate provides the page store consumed by index maintenance:
//! - One frame per block, addressed densely by block number
//! - Pin counting for concurrent access
//! - Share/exclusive page content locks
//! - Relation-extension lock for safe concurrent growth
//! - Dirty page tracking for write-back

mod frame;
mod pool;

pub use frame::BufferFrame;
pub use pool::{Buffer, BufferPool, BufferPoolStats, ExtensionLock};

//! Arbor common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Arbor components.

pub mod config;
pub mod error;
pub mod page;

pub use config::VacuumConfig;
pub use error::{ArborError, Result};
pub use page::{BlockNumber, FIRST_OFFSET, OffsetNumber, PAGE_SIZE};

//! sw-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the scheduler and the
//! `sweeper` binary, providing type-safe identifiers, a unified error type,
//! the work-item model shared by every queue, application configuration,
//! and a broadcast event bus for progress reporting.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod work;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use work::*;

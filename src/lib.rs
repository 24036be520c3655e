//! Sweeper - throttled background scheduler for media-library extraction work
//!
//! This library crate exposes the simulation harness for integration testing.

pub mod simulate;

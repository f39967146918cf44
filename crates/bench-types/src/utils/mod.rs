//! Utility functions for the benchmark types.

pub mod formatting;

pub use formatting::{truncate_id, with_0x_prefix};

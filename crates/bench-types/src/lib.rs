//! Common types module for the benchmark secondary.
//!
//! This module defines the data model shared by every benchmark component:
//! transaction identities and descriptors, chain blocks and headers, fee caps,
//! workload shards and the result summary reported back to the primary.

/// Chain-facing types: blocks, headers, fee caps and chain selectors.
pub mod chain;
/// Benchmark result summary returned to the primary.
pub mod results;
/// Secure string wrapper for private keys.
pub mod secret_string;
/// Transaction identities, unsigned descriptors and signed payloads.
pub mod transaction;
/// Utility functions for formatting.
pub mod utils;
/// Workload shard types and parsing.
pub mod workload;

pub use chain::*;
pub use results::*;
pub use secret_string::SecretString;
pub use transaction::*;
pub use utils::{truncate_id, with_0x_prefix};
pub use workload::*;

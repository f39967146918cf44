//! Result summary types.

use serde::{Deserialize, Serialize};

/// Aggregate statistics of one benchmark run, returned for RESULTS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchResults {
	/// Latency of every confirmed transaction, in milliseconds.
	pub tx_latencies: Vec<f64>,
	/// Mean of `tx_latencies`, or 0 when nothing confirmed.
	pub average_latency: f64,
	/// Confirmed transactions per second over the run.
	pub throughput: f64,
	/// Confirmations per sampling window.
	pub throughput_seconds: Vec<f64>,
	pub success: u64,
	pub fail: u64,
}

//! Workload shard types.
//!
//! The primary sends each secondary one JSON document holding a shard per
//! worker thread. A shard is a sequence of intervals, and each interval is the
//! list of transaction descriptors to dispatch during that window. Descriptors
//! stay opaque JSON until [`parse_workload`] turns them into typed
//! transactions, so an unmarshal failure and a bad descriptor are reported
//! separately.

use crate::UnsignedTransaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque transaction descriptor produced by the workload generator.
pub type TransactionDescriptor = serde_json::Value;

/// Transactions to dispatch during one window.
pub type Interval<T = TransactionDescriptor> = Vec<T>;

/// Workload of a single worker thread.
pub type ThreadWorkload<T = TransactionDescriptor> = Vec<Interval<T>>;

/// Errors that can occur while parsing a workload shard.
#[derive(Debug, Error)]
pub enum WorkloadError {
	/// The shard document itself is not valid JSON of the expected shape.
	#[error("Failed to unmarshal workload: {0}")]
	Unmarshal(#[from] serde_json::Error),
	/// A descriptor could not be converted into a transaction.
	#[error("Invalid transaction at thread {thread}, interval {interval}, index {index}: {reason}")]
	Descriptor {
		thread: usize,
		interval: usize,
		index: usize,
		reason: String,
	},
}

/// Full workload document for one secondary: one shard per worker thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecondaryWorkload(pub Vec<ThreadWorkload>);

impl SecondaryWorkload {
	/// Decodes the JSON body of a WORKLOAD command.
	pub fn from_slice(bytes: &[u8]) -> Result<Self, WorkloadError> {
		Ok(serde_json::from_slice(bytes)?)
	}
}

/// Typed workload ready for dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedWorkload {
	pub threads: Vec<ThreadWorkload<UnsignedTransaction>>,
}

impl ParsedWorkload {
	/// Total number of transactions across all threads and intervals.
	pub fn total_transactions(&self) -> usize {
		self.threads
			.iter()
			.flat_map(|thread| thread.iter())
			.map(|interval| interval.len())
			.sum()
	}

	/// Number of intervals of the longest thread.
	pub fn interval_count(&self) -> usize {
		self.threads.iter().map(|t| t.len()).max().unwrap_or(0)
	}
}

/// Converts every descriptor of a workload into a typed transaction.
pub fn parse_workload(workload: SecondaryWorkload) -> Result<ParsedWorkload, WorkloadError> {
	let mut threads = Vec::with_capacity(workload.0.len());

	for (thread_idx, thread) in workload.0.into_iter().enumerate() {
		let mut intervals = Vec::with_capacity(thread.len());
		for (interval_idx, interval) in thread.into_iter().enumerate() {
			let mut txs = Vec::with_capacity(interval.len());
			for (index, descriptor) in interval.into_iter().enumerate() {
				let tx: UnsignedTransaction =
					serde_json::from_value(descriptor).map_err(|e| WorkloadError::Descriptor {
						thread: thread_idx,
						interval: interval_idx,
						index,
						reason: e.to_string(),
					})?;
				txs.push(tx);
			}
			intervals.push(txs);
		}
		threads.push(intervals);
	}

	Ok(ParsedWorkload { threads })
}

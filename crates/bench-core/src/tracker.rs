//! Confirmation tracking.
//!
//! The dispatch engine registers every submitted transaction here, and two
//! independent feeds (live head events and historical block scans) report the
//! hashes they see in blocks. A record moves from pending to confirmed at most
//! once, so both feeds may report the same transaction without double
//! counting.

use bench_types::TransactionHash;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Lifecycle of one submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionRecord {
	/// Accepted by a node, not yet seen in a block.
	Pending { sent_at: DateTime<Utc> },
	/// Seen in a block.
	Confirmed {
		sent_at: DateTime<Utc>,
		confirmed_at: DateTime<Utc>,
	},
	/// Refused at submission; never confirms.
	Failed { sent_at: DateTime<Utc> },
}

impl TransactionRecord {
	pub fn sent_at(&self) -> DateTime<Utc> {
		match *self {
			TransactionRecord::Pending { sent_at }
			| TransactionRecord::Confirmed { sent_at, .. }
			| TransactionRecord::Failed { sent_at } => sent_at,
		}
	}

	/// Timestamp list in the legacy layout.
	///
	/// `[sent]` while pending, `[sent, confirmed]` once confirmed and
	/// `[sent, sent]` for a failure.
	pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
		match *self {
			TransactionRecord::Pending { sent_at } => vec![sent_at],
			TransactionRecord::Confirmed {
				sent_at,
				confirmed_at,
			} => vec![sent_at, confirmed_at],
			TransactionRecord::Failed { sent_at } => vec![sent_at, sent_at],
		}
	}
}

#[derive(Default)]
struct TrackerState {
	records: HashMap<TransactionHash, TransactionRecord>,
	closed: bool,
}

/// Table of submitted transactions behind one coarse lock.
#[derive(Default)]
pub struct ConfirmationTracker {
	state: Mutex<TrackerState>,
}

impl ConfirmationTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an accepted submission. A hash already present is left as is.
	pub fn record_sent(&self, hash: TransactionHash, sent_at: DateTime<Utc>) {
		self.state
			.lock()
			.records
			.entry(hash)
			.or_insert(TransactionRecord::Pending { sent_at });
	}

	/// Registers a refused submission.
	pub fn record_failed(&self, hash: TransactionHash, sent_at: DateTime<Utc>) {
		self.state
			.lock()
			.records
			.insert(hash, TransactionRecord::Failed { sent_at });
	}

	/// Marks a pending transaction as confirmed.
	///
	/// Returns `true` only for the transition that actually happened. Unknown
	/// hashes, records that are already final, and any call after
	/// [`close`](Self::close) are ignored.
	pub fn record_confirmed(&self, hash: &TransactionHash, confirmed_at: DateTime<Utc>) -> bool {
		let mut state = self.state.lock();
		if state.closed {
			return false;
		}

		let Some(record) = state.records.get_mut(hash) else {
			return false;
		};
		match *record {
			TransactionRecord::Pending { sent_at } => {
				*record = TransactionRecord::Confirmed {
					sent_at,
					confirmed_at,
				};
				true
			}
			_ => false,
		}
	}

	/// Stops accepting confirmations.
	pub fn close(&self) {
		self.state.lock().closed = true;
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Copy of every record for aggregation.
	pub fn snapshot(&self) -> Vec<TransactionRecord> {
		self.state.lock().records.values().copied().collect()
	}

	pub fn get(&self, hash: &TransactionHash) -> Option<TransactionRecord> {
		self.state.lock().records.get(hash).copied()
	}

	pub fn len(&self) -> usize {
		self.state.lock().records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

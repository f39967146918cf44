//! Run counters shared by every dispatch and confirmation task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one benchmark run.
///
/// `completed` counts transactions that reached a final outcome, confirmed
/// or failed, so `completed - failed == confirmed` once every feed is quiet.
#[derive(Debug, Default)]
pub struct RunMetrics {
	sent: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	confirmed: AtomicU64,
}

/// Point-in-time copy of [`RunMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
	pub sent: u64,
	pub completed: u64,
	pub failed: u64,
	pub confirmed: u64,
}

impl RunMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	/// Counts a submission attempt.
	pub fn record_sent(&self) {
		self.sent.fetch_add(1, Ordering::SeqCst);
	}

	/// Counts a transaction that will never confirm.
	pub fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::SeqCst);
		self.completed.fetch_add(1, Ordering::SeqCst);
	}

	/// Counts a first-time confirmation.
	pub fn record_confirmation(&self) {
		self.confirmed.fetch_add(1, Ordering::SeqCst);
		self.completed.fetch_add(1, Ordering::SeqCst);
	}

	pub fn sent(&self) -> u64 {
		self.sent.load(Ordering::SeqCst)
	}

	pub fn completed(&self) -> u64 {
		self.completed.load(Ordering::SeqCst)
	}

	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::SeqCst)
	}

	pub fn confirmed(&self) -> u64 {
		self.confirmed.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			sent: self.sent(),
			completed: self.completed(),
			failed: self.failed(),
			confirmed: self.confirmed(),
		}
	}
}

//! Block scanning for confirmations.
//!
//! Both confirmation feeds end up here: the head watcher scans each new block
//! as it arrives, and the engine scans the run's block range once dispatch has
//! finished to pick up anything the live feed missed. Blocks are fetched as
//! independent tasks, bounded by a semaphore.

use crate::endpoint::Endpoint;
use crate::metrics::RunMetrics;
use crate::tracker::ConfirmationTracker;
use bench_chain::ChainError;
use bench_types::ChainBlock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Attempts per block before a fetch is given up.
const FETCH_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct BlockScanner {
	endpoint: Arc<Endpoint>,
	tracker: Arc<ConfirmationTracker>,
	metrics: Arc<RunMetrics>,
	permits: Arc<Semaphore>,
	retry_backoff: Duration,
}

impl BlockScanner {
	pub fn new(
		endpoint: Arc<Endpoint>,
		tracker: Arc<ConfirmationTracker>,
		metrics: Arc<RunMetrics>,
		max_concurrent: usize,
		retry_backoff: Duration,
	) -> Self {
		Self {
			endpoint,
			tracker,
			metrics,
			permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
			retry_backoff,
		}
	}

	pub fn endpoint(&self) -> &Arc<Endpoint> {
		&self.endpoint
	}

	/// Confirms every tracked transaction of `block`. Returns how many were new.
	pub fn apply_block(&self, block: &ChainBlock, confirmed_at: DateTime<Utc>) -> usize {
		let mut confirmed = 0;
		for hash in &block.transaction_hashes {
			if self.tracker.record_confirmed(hash, confirmed_at) {
				self.metrics.record_confirmation();
				confirmed += 1;
			}
		}
		confirmed
	}

	/// Fetches a block, retrying transient failures with a fixed backoff.
	pub async fn fetch_block(&self, number: u64) -> Result<ChainBlock, ChainError> {
		let mut attempt = 1;
		loop {
			match self.endpoint.block_by_number(number).await {
				Ok(block) => return Ok(block),
				Err(ChainError::Closed) => return Err(ChainError::Closed),
				Err(e) if attempt >= FETCH_ATTEMPTS => return Err(e),
				Err(e) => {
					tracing::debug!(block = number, attempt, error = %e, "Block fetch failed, retrying");
					attempt += 1;
					tokio::time::sleep(self.retry_backoff).await;
				}
			}
		}
	}

	/// Scans a freshly announced block, stamping confirmations with the
	/// current time.
	pub async fn scan_head(&self, number: u64) -> usize {
		let _permit = match self.permits.acquire().await {
			Ok(permit) => permit,
			Err(_) => return 0,
		};
		match self.fetch_block(number).await {
			Ok(block) => {
				let confirmed = self.apply_block(&block, Utc::now());
				if confirmed > 0 {
					tracing::debug!(block = number, confirmed, "Confirmed transactions from head");
				}
				confirmed
			}
			Err(e) => {
				tracing::warn!(block = number, error = %e, "Failed to fetch head block");
				0
			}
		}
	}

	/// Scans blocks `from..=to`, stamping confirmations with each block's
	/// own timestamp. Returns the number of new confirmations.
	pub async fn scan_range(&self, from: u64, to: u64) -> usize {
		if from > to {
			return 0;
		}

		let mut tasks = Vec::new();
		for number in from..=to {
			let permit = match self.permits.clone().acquire_owned().await {
				Ok(permit) => permit,
				Err(e) => {
					tracing::error!("Failed to acquire block scan permit: {}", e);
					break;
				}
			};
			let scanner = self.clone();
			tasks.push(tokio::spawn(async move {
				let _permit = permit;
				match scanner.fetch_block(number).await {
					Ok(block) => {
						let confirmed_at = block_time(&block);
						scanner.apply_block(&block, confirmed_at)
					}
					Err(e) => {
						tracing::warn!(block = number, error = %e, "Giving up on block");
						0
					}
				}
			}));
		}

		let mut confirmed = 0;
		for task in futures::future::join_all(tasks).await {
			confirmed += task.unwrap_or(0);
		}
		tracing::info!(from, to, confirmed, "Scanned block range");
		confirmed
	}
}

fn block_time(block: &ChainBlock) -> DateTime<Utc> {
	i64::try_from(block.timestamp)
		.ok()
		.and_then(|secs| DateTime::from_timestamp(secs, 0))
		.unwrap_or_else(Utc::now)
}

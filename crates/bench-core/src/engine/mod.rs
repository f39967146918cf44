//! Benchmark engine of a secondary.
//!
//! The engine owns everything one benchmark needs: the connected endpoints and
//! their per-thread dispatchers, the confirmation tracker and run counters,
//! the loaded workload and the outcome of the run. The secondary's command
//! loop calls into it once per accepted command.

pub mod lifecycle;

use crate::dispatch::Dispatcher;
use crate::endpoint::Endpoint;
use crate::metrics::RunMetrics;
use crate::monitoring::{BlockScanner, HeadWatcherHandle, ThroughputSampler};
use crate::results::aggregate;
use crate::tracker::ConfirmationTracker;
use bench_account::AccountService;
use bench_chain::ChainConnector;
use bench_config::Config;
use bench_types::{
	parse_workload, BenchResults, ParsedWorkload, SecondaryWorkload, ThreadWorkload,
	UnsignedTransaction, WorkloadError,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often the engine checks whether every sent transaction completed.
const CONFIRMATION_POLL: Duration = Duration::from_millis(50);

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error(transparent)]
	Workload(#[from] WorkloadError),
	#[error("Invalid thread count: {0}")]
	InvalidThreads(u32),
	#[error("Workload has {actual} thread shards, expected {expected}")]
	ThreadMismatch { expected: usize, actual: usize },
	#[error("Already prepared")]
	AlreadyPrepared,
	#[error("Not prepared")]
	NotPrepared,
	#[error("No workload loaded")]
	NoWorkload,
	#[error("No run to report")]
	NoRun,
}

/// Connections and background tasks set up by PREPARE.
pub(crate) struct Session {
	secondary_id: u32,
	workers: Vec<Arc<Dispatcher>>,
	endpoints: Vec<Arc<Endpoint>>,
	pollers: Vec<JoinHandle<()>>,
	head_watcher: Option<HeadWatcherHandle>,
	scanner: BlockScanner,
}

impl Session {
	/// Stops the head watcher and every fee poller.
	async fn stop_feeds(&mut self) {
		if let Some(watcher) = self.head_watcher.take() {
			watcher.stop().await;
		}
		for endpoint in &self.endpoints {
			endpoint.stop();
		}
	}
}

struct RunState {
	start: DateTime<Utc>,
	sampler: Option<ThroughputSampler>,
	results: Option<BenchResults>,
}

/// Benchmark engine of one secondary.
pub struct BenchEngine {
	pub(crate) config: Config,
	pub(crate) connector: Arc<dyn ChainConnector>,
	pub(crate) account: Arc<AccountService>,
	pub(crate) tracker: Arc<ConfirmationTracker>,
	pub(crate) metrics: Arc<RunMetrics>,
	pub(crate) session: Option<Session>,
	workload: Option<ParsedWorkload>,
	run: Option<RunState>,
}

impl BenchEngine {
	pub fn new(
		config: Config,
		connector: Arc<dyn ChainConnector>,
		account: Arc<AccountService>,
	) -> Self {
		Self {
			config,
			connector,
			account,
			tracker: Arc::new(ConfirmationTracker::new()),
			metrics: Arc::new(RunMetrics::new()),
			session: None,
			workload: None,
			run: None,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn metrics(&self) -> &Arc<RunMetrics> {
		&self.metrics
	}

	pub fn tracker(&self) -> &Arc<ConfirmationTracker> {
		&self.tracker
	}

	/// Id assigned by the primary, once prepared.
	pub fn secondary_id(&self) -> Option<u32> {
		self.session.as_ref().map(|s| s.secondary_id)
	}

	/// Decodes and stores a workload, replacing any previous one.
	///
	/// Returns the number of transactions loaded.
	pub fn load_workload(&mut self, body: &[u8]) -> Result<usize, EngineError> {
		let session = self.session.as_ref().ok_or(EngineError::NotPrepared)?;

		let workload = parse_workload(SecondaryWorkload::from_slice(body)?)?;
		if workload.threads.len() != session.workers.len() {
			return Err(EngineError::ThreadMismatch {
				expected: session.workers.len(),
				actual: workload.threads.len(),
			});
		}

		let total = workload.total_transactions();
		tracing::info!(
			threads = workload.threads.len(),
			intervals = workload.interval_count(),
			transactions = total,
			"Loaded workload"
		);
		self.workload = Some(workload);
		Ok(total)
	}

	/// Replays the loaded workload and waits for it to settle.
	///
	/// Each thread submits one interval per window, spreading the interval's
	/// transactions evenly across it. Once every submission finished, the
	/// engine waits for outstanding confirmations up to the configured timeout
	/// and then scans the blocks produced during the run for any it missed.
	pub async fn run(&mut self) -> Result<(), EngineError> {
		if self.session.is_none() {
			return Err(EngineError::NotPrepared);
		}
		let workload = self.workload.take().ok_or(EngineError::NoWorkload)?;
		let session = self.session.as_ref().ok_or(EngineError::NotPrepared)?;
		let workers = session.workers.clone();
		let scanner = session.scanner.clone();
		let window = self.config.benchmark.window();

		let start_height = match scanner.endpoint().block_height().await {
			Ok(height) => Some(height),
			Err(e) => {
				tracing::warn!(error = %e, "Failed to read start height, backfill disabled");
				None
			}
		};

		let start = Utc::now();
		let sampler = ThroughputSampler::start(self.metrics.clone(), window);
		tracing::info!(
			threads = workers.len(),
			transactions = workload.total_transactions(),
			"Starting run"
		);

		let replays: Vec<_> = workers
			.iter()
			.cloned()
			.zip(workload.threads)
			.map(|(worker, intervals)| tokio::spawn(replay(worker, intervals, window)))
			.collect();
		for result in futures::future::join_all(replays).await {
			if let Err(e) = result {
				tracing::error!("Replay task failed: {}", e);
			}
		}
		for worker in &workers {
			worker.drain().await;
		}

		self.await_confirmations().await;

		if self.config.benchmark.backfill {
			if let Some(from) = start_height {
				match scanner.endpoint().block_height().await {
					Ok(to) => {
						scanner.scan_range(from + 1, to).await;
					}
					Err(e) => tracing::warn!(error = %e, "Failed to read end height, skipping backfill"),
				}
			}
		}

		let metrics = self.metrics.snapshot();
		tracing::info!(
			sent = metrics.sent,
			confirmed = metrics.confirmed,
			failed = metrics.failed,
			"Run finished"
		);
		self.run = Some(RunState {
			start,
			sampler: Some(sampler),
			results: None,
		});
		Ok(())
	}

	async fn await_confirmations(&self) {
		let timeout = self.config.benchmark.confirmation_timeout();
		let metrics = self.metrics.clone();
		let settled = async {
			while metrics.completed() < metrics.sent() {
				tokio::time::sleep(CONFIRMATION_POLL).await;
			}
		};

		if tokio::time::timeout(timeout, settled).await.is_err() {
			tracing::warn!(
				outstanding = metrics.sent().saturating_sub(metrics.completed()),
				"Stopped waiting for confirmations"
			);
		}
	}

	/// Stops the confirmation feeds and summarises the run.
	///
	/// Later calls return the same summary.
	pub async fn results(&mut self) -> Result<BenchResults, EngineError> {
		let run = self.run.as_mut().ok_or(EngineError::NoRun)?;
		if let Some(results) = &run.results {
			return Ok(results.clone());
		}

		if let Some(session) = self.session.as_mut() {
			session.stop_feeds().await;
		}
		self.tracker.close();
		let series = run.sampler.take().map(|s| s.stop()).unwrap_or_default();

		let results = aggregate(
			&self.tracker.snapshot(),
			&series,
			run.start,
			self.metrics.snapshot(),
		);
		tracing::info!(
			success = results.success,
			fail = results.fail,
			throughput = results.throughput,
			average_latency = results.average_latency,
			"Results ready"
		);
		run.results = Some(results.clone());
		Ok(results)
	}
}

/// Submits one thread's intervals, one interval per window.
async fn replay(
	worker: Arc<Dispatcher>,
	intervals: ThreadWorkload<UnsignedTransaction>,
	window: Duration,
) {
	let mut interval_start = Instant::now();
	for interval in intervals {
		let count = u32::try_from(interval.len()).unwrap_or(u32::MAX).max(1);
		let spacing = window / count;
		for (index, tx) in (0u32..).zip(interval) {
			tokio::time::sleep_until(interval_start + spacing * index).await;
			worker.submit(tx).await;
		}
		interval_start += window;
		tokio::time::sleep_until(interval_start).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{account, test_config, workload_body};
	use bench_chain::implementations::mock::MockNetwork;

	async fn prepared(network: &MockNetwork, threads: u32) -> BenchEngine {
		let mut engine = BenchEngine::new(test_config(1), Arc::new(network.connector()), account());
		engine.prepare(0, threads).await.unwrap();
		engine
	}

	#[tokio::test]
	async fn test_workload_requires_prepare() {
		let network = MockNetwork::new();
		let mut engine = BenchEngine::new(test_config(1), Arc::new(network.connector()), account());
		assert!(matches!(
			engine.load_workload(&workload_body(&[&[1]])),
			Err(EngineError::NotPrepared)
		));
	}

	#[tokio::test]
	async fn test_malformed_workload_is_refused() {
		let network = MockNetwork::new();
		let mut engine = prepared(&network, 1).await;

		assert!(matches!(
			engine.load_workload(b"{not json"),
			Err(EngineError::Workload(_))
		));
		assert!(matches!(
			engine.load_workload(&workload_body(&[&[1], &[1]])),
			Err(EngineError::ThreadMismatch {
				expected: 1,
				actual: 2
			})
		));
		assert_eq!(engine.load_workload(&workload_body(&[&[2, 3]])).unwrap(), 5);
		engine.shutdown().await;
	}

	#[tokio::test]
	async fn test_run_without_workload_fails() {
		let network = MockNetwork::new();
		let mut engine = prepared(&network, 1).await;
		assert!(matches!(engine.run().await, Err(EngineError::NoWorkload)));
		assert!(matches!(engine.results().await, Err(EngineError::NoRun)));
		engine.shutdown().await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_rejected_submissions_are_reported_as_failures() {
		let network = MockNetwork::new();
		network.set_reject_submissions(true);
		let mut engine = prepared(&network, 1).await;

		engine.load_workload(&workload_body(&[&[3]])).unwrap();
		engine.run().await.unwrap();
		let results = engine.results().await.unwrap();

		assert_eq!(results.success, 0);
		assert_eq!(results.fail, 3);
		assert_eq!(results.throughput, 0.0);
		assert_eq!(engine.metrics().completed(), 3);
		engine.shutdown().await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_backfill_catches_blocks_mined_without_heads() {
		let network = MockNetwork::new();
		let mut engine = prepared(&network, 1).await;
		// Stop following heads so only the backfill scan can confirm
		if let Some(session) = engine.session.as_mut() {
			if let Some(watcher) = session.head_watcher.take() {
				watcher.stop().await;
			}
		}

		engine.load_workload(&workload_body(&[&[2]])).unwrap();
		let miner = network.spawn_miner(Duration::from_millis(100));
		engine.run().await.unwrap();
		miner.abort();

		let results = engine.results().await.unwrap();
		assert_eq!(results.success, 2);
		assert_eq!(results.fail, 0);
		engine.shutdown().await;
	}
}

//! Transaction dispatch.
//!
//! Each worker thread of the secondary owns a [`Dispatcher`] over its
//! endpoints. Submissions are fire-and-forget: the caller only waits for an
//! in-flight slot, and the send itself runs as its own task that prices, signs,
//! submits and records the transaction.

use crate::endpoint::Endpoint;
use crate::metrics::RunMetrics;
use crate::tracker::ConfirmationTracker;
use bench_account::AccountService;
use bench_types::{truncate_id, UnsignedTransaction};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::instrument;

pub struct Dispatcher {
	endpoints: Vec<Arc<Endpoint>>,
	account: Arc<AccountService>,
	tracker: Arc<ConfirmationTracker>,
	metrics: Arc<RunMetrics>,
	permits: Arc<Semaphore>,
	capacity: u32,
	next_endpoint: AtomicUsize,
}

impl Dispatcher {
	/// Creates a dispatcher over `endpoints`, primary endpoint first.
	pub fn new(
		endpoints: Vec<Arc<Endpoint>>,
		account: Arc<AccountService>,
		tracker: Arc<ConfirmationTracker>,
		metrics: Arc<RunMetrics>,
		max_in_flight: usize,
	) -> Self {
		let capacity = u32::try_from(max_in_flight.max(1)).unwrap_or(u32::MAX);
		Self {
			endpoints,
			account,
			tracker,
			metrics,
			permits: Arc::new(Semaphore::new(capacity as usize)),
			capacity,
			next_endpoint: AtomicUsize::new(0),
		}
	}

	pub fn endpoints(&self) -> &[Arc<Endpoint>] {
		&self.endpoints
	}

	/// Queues a transaction for sending.
	///
	/// The target endpoint is chosen round-robin when this is called, so the
	/// endpoint sequence follows submission order.
	pub async fn submit(&self, tx: UnsignedTransaction) {
		self.metrics.record_sent();

		if self.endpoints.is_empty() {
			tracing::error!("No endpoint to send to");
			self.metrics.record_failure();
			return;
		}
		let index = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
		let endpoint = self.endpoints[index].clone();

		let permit = match self.permits.clone().acquire_owned().await {
			Ok(permit) => permit,
			Err(e) => {
				tracing::error!("Failed to acquire dispatch permit: {}", e);
				self.metrics.record_failure();
				return;
			}
		};

		let account = self.account.clone();
		let tracker = self.tracker.clone();
		let metrics = self.metrics.clone();
		tokio::spawn(async move {
			let _permit = permit;
			send(endpoint, account, tracker, metrics, tx).await;
		});
	}

	/// Waits until every queued submission has finished.
	pub async fn drain(&self) {
		if let Err(e) = self.permits.acquire_many(self.capacity).await {
			tracing::error!("Failed to drain dispatcher: {}", e);
		}
	}
}

#[instrument(skip_all, fields(node = %endpoint.address(), nonce = tx.nonce))]
async fn send(
	endpoint: Arc<Endpoint>,
	account: Arc<AccountService>,
	tracker: Arc<ConfirmationTracker>,
	metrics: Arc<RunMetrics>,
	mut tx: UnsignedTransaction,
) {
	tx.apply_fee_caps(endpoint.fees().current());
	tx.chain_id = Some(endpoint.chain_id());

	let signed = match account.sign(&tx).await {
		Ok(signed) => signed,
		Err(e) => {
			tracing::warn!(error = %e, "Failed to sign transaction");
			metrics.record_failure();
			return;
		}
	};

	let sent_at = Utc::now();
	match endpoint.submit(&signed).await {
		Ok(_) => {
			tracker.record_sent(signed.hash, sent_at);
		}
		Err(e) => {
			tracing::debug!(
				tx_hash = %truncate_id(&signed.hash.to_string()),
				error = %e,
				"Transaction submission failed"
			);
			tracker.record_failed(signed.hash, sent_at);
			metrics.record_failure();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tracker::TransactionRecord;
	use bench_account::implementations::local::create_account;
	use bench_chain::implementations::mock::MockNetwork;
	use bench_chain::ChainConnector;
	use bench_config::KeyConfig;
	use std::time::Duration;

	const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const ADDR_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

	fn account() -> Arc<AccountService> {
		let keys = [KeyConfig {
			address: ADDR_0.to_string(),
			private_key: KEY_0.into(),
		}];
		Arc::new(AccountService::new(create_account(&keys).unwrap()))
	}

	fn transfer(nonce: u64) -> UnsignedTransaction {
		serde_json::from_value(serde_json::json!({
			"from": ADDR_0,
			"to": "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
			"nonce": nonce,
			"gas_limit": 21000,
		}))
		.unwrap()
	}

	async fn dispatcher(
		network: &MockNetwork,
		nodes: usize,
		max_in_flight: usize,
	) -> (Dispatcher, Arc<ConfirmationTracker>, Arc<RunMetrics>) {
		let mut endpoints = Vec::new();
		for i in 0..nodes {
			let chain = network
				.connector()
				.connect(&format!("node-{}", i))
				.await
				.unwrap();
			endpoints.push(Arc::new(Endpoint::new(chain, Duration::from_secs(1))));
		}
		let tracker = Arc::new(ConfirmationTracker::new());
		let metrics = Arc::new(RunMetrics::new());
		let dispatcher = Dispatcher::new(
			endpoints,
			account(),
			tracker.clone(),
			metrics.clone(),
			max_in_flight,
		);
		(dispatcher, tracker, metrics)
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_every_submission_is_recorded() {
		let network = MockNetwork::new();
		let (dispatcher, tracker, metrics) = dispatcher(&network, 3, 8).await;

		for nonce in 0..200 {
			dispatcher.submit(transfer(nonce)).await;
		}
		dispatcher.drain().await;

		assert_eq!(metrics.sent(), 200);
		assert_eq!(tracker.len(), 200);
		assert_eq!(network.submitted_count(), 200);
		assert_eq!(metrics.failed(), 0);
	}

	#[tokio::test]
	async fn test_round_robin_uses_every_endpoint() {
		let network = MockNetwork::new();
		let (dispatcher, _, _) = dispatcher(&network, 3, 4).await;
		for nonce in 0..6 {
			dispatcher.submit(transfer(nonce)).await;
		}
		dispatcher.drain().await;
		assert_eq!(dispatcher.next_endpoint.load(Ordering::SeqCst), 6);
	}

	/// Mock chain node that counts the submissions it receives.
	struct CountingChain {
		inner: Arc<dyn bench_chain::ChainInterface>,
		submits: std::sync::atomic::AtomicU64,
	}

	#[async_trait::async_trait]
	impl bench_chain::ChainInterface for CountingChain {
		fn address(&self) -> &str {
			self.inner.address()
		}

		fn chain_id(&self) -> u64 {
			self.inner.chain_id()
		}

		async fn submit(
			&self,
			tx: &bench_types::SignedTransaction,
		) -> Result<bench_types::TransactionHash, bench_chain::ChainError> {
			self.submits.fetch_add(1, Ordering::SeqCst);
			self.inner.submit(tx).await
		}

		async fn current_fee_hint(&self) -> Result<bench_types::FeeCaps, bench_chain::ChainError> {
			self.inner.current_fee_hint().await
		}

		async fn block_by_number(
			&self,
			number: u64,
		) -> Result<bench_types::ChainBlock, bench_chain::ChainError> {
			self.inner.block_by_number(number).await
		}

		async fn block_height(&self) -> Result<u64, bench_chain::ChainError> {
			self.inner.block_height().await
		}

		async fn subscribe_new_heads(
			&self,
		) -> Result<bench_chain::HeadStream, bench_chain::ChainError> {
			self.inner.subscribe_new_heads().await
		}

		async fn close(&self) {
			self.inner.close().await
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_submitters_share_endpoints_evenly() {
		const NODES: usize = 4;
		const TASKS: u64 = 400;

		let network = MockNetwork::new();
		let mut chains = Vec::new();
		for i in 0..NODES {
			let inner = network
				.connector()
				.connect(&format!("node-{}", i))
				.await
				.unwrap();
			chains.push(Arc::new(CountingChain {
				inner,
				submits: std::sync::atomic::AtomicU64::new(0),
			}));
		}
		let endpoints = chains
			.iter()
			.map(|chain| Arc::new(Endpoint::new(chain.clone(), Duration::from_secs(1))))
			.collect();
		let tracker = Arc::new(ConfirmationTracker::new());
		let metrics = Arc::new(RunMetrics::new());
		let dispatcher = Arc::new(Dispatcher::new(
			endpoints,
			account(),
			tracker.clone(),
			metrics.clone(),
			16,
		));

		let submitters: Vec<_> = (0..TASKS)
			.map(|nonce| {
				let dispatcher = dispatcher.clone();
				tokio::spawn(async move { dispatcher.submit(transfer(nonce)).await })
			})
			.collect();
		for result in futures::future::join_all(submitters).await {
			result.unwrap();
		}
		dispatcher.drain().await;

		assert_eq!(metrics.sent(), TASKS);
		assert_eq!(metrics.failed(), 0);
		assert_eq!(tracker.len(), TASKS as usize);
		for chain in &chains {
			assert_eq!(
				chain.submits.load(Ordering::SeqCst),
				TASKS / NODES as u64,
				"uneven share for {}",
				chain.inner.address()
			);
		}
	}

	#[tokio::test]
	async fn test_rejected_submission_is_marked_failed() {
		let network = MockNetwork::new();
		network.set_reject_submissions(true);
		let (dispatcher, tracker, metrics) = dispatcher(&network, 1, 4).await;

		dispatcher.submit(transfer(0)).await;
		dispatcher.drain().await;

		assert_eq!(metrics.failed(), 1);
		assert_eq!(metrics.completed(), 1);
		let records = tracker.snapshot();
		assert_eq!(records.len(), 1);
		assert!(matches!(records[0], TransactionRecord::Failed { .. }));
	}

	#[tokio::test]
	async fn test_signing_failure_fails_only_that_transaction() {
		let network = MockNetwork::new();
		let (dispatcher, tracker, metrics) = dispatcher(&network, 1, 4).await;

		let mut stranger = transfer(0);
		stranger.from = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap();
		dispatcher.submit(stranger).await;
		dispatcher.submit(transfer(1)).await;
		dispatcher.drain().await;

		assert_eq!(metrics.sent(), 2);
		assert_eq!(metrics.failed(), 1);
		assert_eq!(tracker.len(), 1);
		assert_eq!(network.submitted_count(), 1);
	}

	struct RecordingAccount(Arc<parking_lot::Mutex<Vec<UnsignedTransaction>>>);

	#[async_trait::async_trait]
	impl bench_account::AccountInterface for RecordingAccount {
		fn addresses(&self) -> Vec<alloy_primitives::Address> {
			Vec::new()
		}

		async fn sign_transaction(
			&self,
			tx: &UnsignedTransaction,
		) -> Result<bench_types::SignedTransaction, bench_account::AccountError> {
			self.0.lock().push(tx.clone());
			Ok(bench_types::SignedTransaction {
				hash: bench_types::TransactionHash(vec![tx.nonce as u8; 32]),
				raw: Default::default(),
			})
		}
	}

	#[tokio::test]
	async fn test_fee_caps_and_chain_id_are_applied() {
		let network = MockNetwork::new();
		let chain = network.connector().connect("node-0").await.unwrap();
		let endpoint = Arc::new(Endpoint::new(chain, Duration::from_secs(1)));
		endpoint
			.fees()
			.propose(bench_types::FeeCaps::new(7, 70), Utc::now());

		let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
		let dispatcher = Dispatcher::new(
			vec![endpoint],
			Arc::new(AccountService::new(Box::new(RecordingAccount(seen.clone())))),
			Arc::new(ConfirmationTracker::new()),
			Arc::new(RunMetrics::new()),
			4,
		);

		dispatcher.submit(transfer(0)).await;
		dispatcher.drain().await;

		let seen = seen.lock();
		assert_eq!(seen.len(), 1);
		assert_eq!(seen[0].max_priority_fee_per_gas, 7);
		assert_eq!(seen[0].max_fee_per_gas, 70);
		assert_eq!(
			seen[0].chain_id,
			Some(bench_chain::implementations::mock::MOCK_CHAIN_ID)
		);
	}
}

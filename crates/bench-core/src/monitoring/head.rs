//! New-head watcher.
//!
//! Follows the head subscription of one endpoint. For every new head it spawns
//! a scan of that block for confirmations and a fee refresh that proposes the
//! same caps to every endpoint of the secondary.

use crate::endpoint::Endpoint;
use crate::monitoring::scanner::BlockScanner;
use bench_chain::{ChainError, HeadStream};
use bench_types::{ChainHeader, FeeCaps};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct HeadWatcher {
	scanner: BlockScanner,
	endpoints: Arc<Vec<Arc<Endpoint>>>,
}

/// Running watcher. Dropping it without [`stop`](Self::stop) leaves the task running.
pub struct HeadWatcherHandle {
	stop_tx: mpsc::Sender<()>,
	task: JoinHandle<()>,
}

impl HeadWatcherHandle {
	/// Signals the watcher loop and waits for it to exit.
	pub async fn stop(self) {
		let _ = self.stop_tx.send(()).await;
		if let Err(e) = self.task.await {
			tracing::warn!("Head watcher task failed: {}", e);
		}
	}
}

impl HeadWatcher {
	/// `scanner` also provides the endpoint whose heads are followed.
	pub fn new(scanner: BlockScanner, endpoints: Vec<Arc<Endpoint>>) -> Self {
		Self {
			scanner,
			endpoints: Arc::new(endpoints),
		}
	}

	/// Subscribes and starts the watcher loop.
	///
	/// The subscription is opened before returning so a node without head
	/// notifications is reported to the caller.
	pub async fn start(self) -> Result<HeadWatcherHandle, ChainError> {
		let heads = self.scanner.endpoint().subscribe_new_heads().await?;
		let (stop_tx, stop_rx) = mpsc::channel(1);
		let task = tokio::spawn(self.watch(heads, stop_rx));
		Ok(HeadWatcherHandle { stop_tx, task })
	}

	async fn watch(self, mut heads: HeadStream, mut stop_rx: mpsc::Receiver<()>) {
		tracing::info!(node = %self.scanner.endpoint().address(), "Watching new heads");

		loop {
			tokio::select! {
				next = heads.next() => {
					let Some(header) = next else {
						tracing::warn!("Head subscription ended");
						break;
					};

					let scanner = self.scanner.clone();
					tokio::spawn(async move {
						scanner.scan_head(header.number).await;
					});

					let source = self.scanner.endpoint().clone();
					let endpoints = self.endpoints.clone();
					tokio::spawn(async move {
						refresh_fees(&source, &endpoints, header).await;
					});
				}
				_ = stop_rx.recv() => {
					tracing::info!("Stopping head watcher");
					break;
				}
			}
		}
	}
}

/// Derives caps from the source's tip and the header's next base fee and
/// proposes them to every endpoint.
async fn refresh_fees(source: &Endpoint, endpoints: &[Arc<Endpoint>], header: ChainHeader) {
	let observed_at = Utc::now();
	let hint = match source.fee_hint().await {
		Ok(hint) => hint,
		Err(e) => {
			tracing::debug!(block = header.number, error = %e, "Failed to read tip for head");
			return;
		}
	};

	let caps = FeeCaps::from_tip_and_base_fee(hint.tip_cap, header.next_base_fee() as u128);
	for endpoint in endpoints {
		if endpoint.fees().propose(caps, observed_at) {
			tracing::debug!(
				node = %endpoint.address(),
				block = header.number,
				fee_cap = caps.fee_cap,
				"Updated fee caps from head"
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::metrics::RunMetrics;
	use crate::tracker::ConfirmationTracker;
	use bench_chain::implementations::mock::MockNetwork;
	use bench_chain::ChainConnector;
	use bench_types::{SignedTransaction, TransactionHash};
	use std::time::Duration;

	async fn endpoint(network: &MockNetwork, address: &str) -> Arc<Endpoint> {
		let chain = network.connector().connect(address).await.unwrap();
		Arc::new(Endpoint::new(chain, Duration::from_secs(1)))
	}

	async fn wait_for(mut check: impl FnMut() -> bool) {
		for _ in 0..200 {
			if check() {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("condition not reached");
	}

	#[tokio::test]
	async fn test_head_updates_every_endpoint_and_confirms() {
		let network = MockNetwork::new();
		let primary = endpoint(&network, "node-0").await;
		let secondary = endpoint(&network, "node-1").await;
		let tracker = Arc::new(ConfirmationTracker::new());
		let metrics = Arc::new(RunMetrics::new());
		let scanner = BlockScanner::new(
			primary.clone(),
			tracker.clone(),
			metrics.clone(),
			4,
			Duration::from_millis(10),
		);

		let handle = HeadWatcher::new(scanner, vec![primary.clone(), secondary.clone()])
			.start()
			.await
			.unwrap();

		let tx = SignedTransaction {
			hash: TransactionHash(vec![3; 32]),
			raw: Default::default(),
		};
		secondary.submit(&tx).await.unwrap();
		tracker.record_sent(tx.hash.clone(), Utc::now());
		network.mine();

		wait_for(|| metrics.confirmed() == 1).await;
		wait_for(|| primary.fees().current().fee_cap > 0 && secondary.fees().current().fee_cap > 0)
			.await;
		assert_eq!(primary.fees().current(), secondary.fees().current());

		handle.stop().await;
	}

	#[tokio::test]
	async fn test_stop_ends_loop() {
		let network = MockNetwork::new();
		let primary = endpoint(&network, "node-0").await;
		let scanner = BlockScanner::new(
			primary.clone(),
			Arc::new(ConfirmationTracker::new()),
			Arc::new(RunMetrics::new()),
			1,
			Duration::from_millis(10),
		);
		let handle = HeadWatcher::new(scanner, vec![primary]).start().await.unwrap();
		tokio::time::timeout(Duration::from_secs(1), handle.stop())
			.await
			.unwrap();
	}
}

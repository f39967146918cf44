//! Connection setup and teardown of the benchmark engine.

use super::{BenchEngine, EngineError, Session};
use crate::dispatch::Dispatcher;
use crate::endpoint::Endpoint;
use crate::monitoring::{BlockScanner, FeePoller, HeadWatcher};
use std::sync::Arc;
use std::time::Duration;

/// Delay between attempts to fetch a block while scanning.
const SCAN_RETRY_BACKOFF: Duration = Duration::from_millis(100);

impl BenchEngine {
	/// Connects one worker per thread to every configured node.
	///
	/// A worker's primary node is chosen by `secondary_id` so secondaries spread
	/// across nodes; the other nodes follow in configuration order. Each
	/// endpoint reads its fee caps once before this returns and keeps them
	/// fresh in the background afterwards. Heads are followed on the primary
	/// endpoint of the first worker.
	///
	/// On failure every connection opened so far is closed.
	pub async fn prepare(&mut self, secondary_id: u32, threads: u32) -> Result<(), EngineError> {
		if threads == 0 {
			return Err(EngineError::InvalidThreads(threads));
		}
		if self.session.is_some() {
			return Err(EngineError::AlreadyPrepared);
		}

		let nodes = node_order(&self.config.chain.nodes, secondary_id);
		if nodes.is_empty() {
			return Err(EngineError::Connection("no chain nodes configured".into()));
		}

		let bench = &self.config.benchmark;
		let mut endpoints: Vec<Arc<Endpoint>> = Vec::new();
		let mut workers = Vec::with_capacity(threads as usize);

		for thread in 0..threads {
			let mut worker_endpoints = Vec::with_capacity(nodes.len());
			for address in &nodes {
				let chain = match self.connector.connect(address).await {
					Ok(chain) => chain,
					Err(e) => {
						tracing::error!(thread, node = %address, error = %e, "Failed to connect");
						close_all(&endpoints).await;
						return Err(EngineError::Connection(format!("{}: {}", address, e)));
					}
				};
				let endpoint = Arc::new(Endpoint::new(chain, bench.rpc_timeout()));
				endpoints.push(endpoint.clone());
				worker_endpoints.push(endpoint);
			}
			workers.push(Arc::new(Dispatcher::new(
				worker_endpoints,
				self.account.clone(),
				self.tracker.clone(),
				self.metrics.clone(),
				bench.max_in_flight,
			)));
		}

		let pollers: Vec<FeePoller> = endpoints
			.iter()
			.map(|endpoint| {
				FeePoller::new(
					endpoint.clone(),
					bench.fee_poll_interval(),
					bench.fee_retry_backoff(),
				)
			})
			.collect();
		futures::future::join_all(pollers.iter().map(|p| p.refresh())).await;
		let pollers = pollers.into_iter().map(FeePoller::spawn).collect();

		let scanner = BlockScanner::new(
			workers[0].endpoints()[0].clone(),
			self.tracker.clone(),
			self.metrics.clone(),
			bench.max_block_scans,
			SCAN_RETRY_BACKOFF,
		);
		let head_watcher = match HeadWatcher::new(scanner.clone(), endpoints.clone())
			.start()
			.await
		{
			Ok(handle) => handle,
			Err(e) => {
				tracing::error!(error = %e, "Failed to subscribe to new heads");
				close_all(&endpoints).await;
				return Err(EngineError::Connection(format!("head subscription: {}", e)));
			}
		};

		tracing::info!(
			secondary_id,
			threads,
			primary = %nodes[0],
			endpoints = endpoints.len(),
			"Prepared"
		);
		self.session = Some(Session {
			secondary_id,
			workers,
			endpoints,
			pollers,
			head_watcher: Some(head_watcher),
			scanner,
		});
		Ok(())
	}

	/// Stops every background task and closes every connection.
	///
	/// Safe to call in any state, and more than once.
	pub async fn shutdown(&mut self) {
		self.tracker.close();
		if let Some(run) = self.run.as_mut() {
			if let Some(sampler) = run.sampler.take() {
				sampler.stop();
			}
		}

		let Some(mut session) = self.session.take() else {
			return;
		};
		tracing::info!(secondary_id = session.secondary_id, "Shutting down");
		session.stop_feeds().await;
		for poller in session.pollers.drain(..) {
			poller.abort();
		}
		close_all(&session.endpoints).await;
	}
}

/// Node addresses with the primary node for `secondary_id` first.
fn node_order(nodes: &[String], secondary_id: u32) -> Vec<String> {
	if nodes.is_empty() {
		return Vec::new();
	}
	let primary = secondary_id as usize % nodes.len();
	let mut order = Vec::with_capacity(nodes.len());
	order.push(nodes[primary].clone());
	order.extend(
		nodes
			.iter()
			.enumerate()
			.filter(|(i, _)| *i != primary)
			.map(|(_, node)| node.clone()),
	);
	order
}

async fn close_all(endpoints: &[Arc<Endpoint>]) {
	futures::future::join_all(endpoints.iter().map(|e| e.close())).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{account, test_config};
	use bench_chain::implementations::mock::MockNetwork;
	use bench_chain::ChainConnector;

	fn nodes(n: usize) -> Vec<String> {
		(0..n).map(|i| format!("node-{}", i)).collect()
	}

	#[test]
	fn test_node_order_rotates_primary() {
		assert_eq!(node_order(&nodes(3), 0), vec!["node-0", "node-1", "node-2"]);
		assert_eq!(node_order(&nodes(3), 4), vec!["node-1", "node-0", "node-2"]);
		assert_eq!(node_order(&nodes(3), 5), vec!["node-2", "node-0", "node-1"]);
		assert!(node_order(&[], 1).is_empty());
	}

	#[tokio::test]
	async fn test_prepare_connects_every_thread_to_every_node() {
		let network = MockNetwork::new();
		let mut engine = BenchEngine::new(
			test_config(3),
			Arc::new(network.connector()),
			account(),
		);

		engine.prepare(4, 2).await.unwrap();

		let session = engine.session.as_ref().unwrap();
		assert_eq!(session.workers.len(), 2);
		assert_eq!(session.endpoints.len(), 6);
		for worker in &session.workers {
			assert_eq!(worker.endpoints()[0].address(), "node-1");
		}
		assert_eq!(session.scanner.endpoint().address(), "node-1");
		// Every endpoint read its fee caps once before returning
		assert!(network.fee_reads() >= 6);
		assert!(session.endpoints.iter().all(|e| e.fees().observed_at().is_some()));
		assert_eq!(engine.secondary_id(), Some(4));

		engine.shutdown().await;
		assert!(engine.secondary_id().is_none());
	}

	#[tokio::test]
	async fn test_prepare_rejects_zero_threads() {
		let network = MockNetwork::new();
		let mut engine = BenchEngine::new(test_config(1), Arc::new(network.connector()), account());
		assert!(matches!(
			engine.prepare(0, 0).await,
			Err(EngineError::InvalidThreads(0))
		));
	}

	#[tokio::test]
	async fn test_failed_connect_leaves_engine_unprepared() {
		let network = MockNetwork::new();
		network.set_refuse_connections(true);
		let mut engine = BenchEngine::new(test_config(2), Arc::new(network.connector()), account());

		let result = engine.prepare(0, 1).await;
		assert!(matches!(result, Err(EngineError::Connection(_))));
		assert!(engine.secondary_id().is_none());
	}

	#[tokio::test]
	async fn test_shutdown_closes_endpoints() {
		let network = MockNetwork::new();
		let mut engine = BenchEngine::new(test_config(1), Arc::new(network.connector()), account());
		engine.prepare(0, 1).await.unwrap();
		let endpoint = engine.session.as_ref().unwrap().endpoints[0].clone();

		engine.shutdown().await;
		engine.shutdown().await;

		assert!(endpoint.is_stopped());
		assert!(endpoint.block_height().await.is_err());
		assert!(engine.tracker().is_closed());
		// A fresh adapter still reaches the chain
		assert!(network.connector().connect("node-0").await.is_ok());
	}
}

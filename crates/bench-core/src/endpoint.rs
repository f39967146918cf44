//! One live connection to a chain node.
//!
//! An endpoint bundles the chain adapter, its fee cap cache and the stop flag
//! its poller watches. Every adapter call made through an endpoint is bounded
//! by the configured RPC timeout.

use crate::fees::FeeCapCache;
use bench_chain::{ChainError, ChainInterface, HeadStream};
use bench_types::{ChainBlock, FeeCaps, SignedTransaction, TransactionHash};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Endpoint {
	chain: Arc<dyn ChainInterface>,
	fees: FeeCapCache,
	stopped: AtomicBool,
	rpc_timeout: Duration,
}

impl Endpoint {
	pub fn new(chain: Arc<dyn ChainInterface>, rpc_timeout: Duration) -> Self {
		Self {
			chain,
			fees: FeeCapCache::new(),
			stopped: AtomicBool::new(false),
			rpc_timeout,
		}
	}

	pub fn address(&self) -> &str {
		self.chain.address()
	}

	pub fn chain_id(&self) -> u64 {
		self.chain.chain_id()
	}

	pub fn fees(&self) -> &FeeCapCache {
		&self.fees
	}

	/// Asks the poller to exit on its next iteration.
	pub fn stop(&self) {
		self.stopped.store(true, Ordering::SeqCst);
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}

	async fn bounded<T>(
		&self,
		call: impl Future<Output = Result<T, ChainError>>,
	) -> Result<T, ChainError> {
		tokio::time::timeout(self.rpc_timeout, call)
			.await
			.map_err(|_| ChainError::Timeout(self.rpc_timeout))?
	}

	pub async fn submit(&self, tx: &SignedTransaction) -> Result<TransactionHash, ChainError> {
		self.bounded(self.chain.submit(tx)).await
	}

	pub async fn fee_hint(&self) -> Result<FeeCaps, ChainError> {
		self.bounded(self.chain.current_fee_hint()).await
	}

	pub async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainError> {
		self.bounded(self.chain.block_by_number(number)).await
	}

	pub async fn block_height(&self) -> Result<u64, ChainError> {
		self.bounded(self.chain.block_height()).await
	}

	pub async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError> {
		self.bounded(self.chain.subscribe_new_heads()).await
	}

	/// Stops the poller and releases the connection.
	pub async fn close(&self) {
		self.stop();
		self.chain.close().await;
	}
}

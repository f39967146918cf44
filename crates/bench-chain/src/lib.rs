//! Chain adapter module for the benchmark secondary.
//!
//! The engine never talks to a node directly. It holds connections through the
//! [`ChainInterface`] trait, obtained from a [`ChainConnector`] selected by
//! chain kind, and only needs a handful of operations: raw submission, a fee
//! hint, block lookups for confirmation scanning, the current height and a
//! stream of new heads.

use async_trait::async_trait;
use bench_types::{ChainBlock, ChainHeader, ChainKind, FeeCaps, SignedTransaction, TransactionHash};
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod mock;
}

/// Errors that can occur while talking to a chain node.
#[derive(Debug, Error)]
pub enum ChainError {
	/// The node could not be reached or the connection dropped.
	#[error("Connection error: {0}")]
	Connection(String),
	/// The node answered with an error or an unexpected response.
	#[error("RPC error: {0}")]
	Rpc(String),
	/// The call did not complete within the configured timeout.
	#[error("Request timed out after {0:?}")]
	Timeout(std::time::Duration),
	/// The node refused a submitted transaction.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	/// The adapter was closed.
	#[error("Chain connection closed")]
	Closed,
}

/// Stream of new block headers.
pub type HeadStream = BoxStream<'static, ChainHeader>;

/// Trait defining the operations the benchmark needs from one chain node.
#[async_trait]
pub trait ChainInterface: Send + Sync {
	/// Address this adapter is connected to.
	fn address(&self) -> &str;

	/// Chain id reported by the node at connection time.
	fn chain_id(&self) -> u64;

	/// Broadcasts a signed transaction and returns the hash assigned by the node.
	async fn submit(&self, tx: &SignedTransaction) -> Result<TransactionHash, ChainError>;

	/// Suggested fee caps for a transaction sent now.
	async fn current_fee_hint(&self) -> Result<FeeCaps, ChainError>;

	/// Fetches a block with its transaction hashes.
	async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainError>;

	/// Number of the latest block.
	async fn block_height(&self) -> Result<u64, ChainError>;

	/// Subscribes to new heads. The stream ends when the connection closes.
	async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError>;

	/// Releases the connection. Later calls fail with [`ChainError::Closed`].
	async fn close(&self);
}

/// Factory for chain adapters of one chain kind.
#[async_trait]
pub trait ChainConnector: Send + Sync {
	/// Chain kind this connector produces adapters for.
	fn kind(&self) -> ChainKind;

	/// Opens a connection to the node at `address` (`host:port`).
	async fn connect(&self, address: &str) -> Result<Arc<dyn ChainInterface>, ChainError>;
}

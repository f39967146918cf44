//! EVM chain adapter built on the Alloy websocket provider.
//!
//! Each adapter owns one websocket connection to a node. Submission uses
//! `eth_sendRawTransaction`, fee hints combine `eth_maxPriorityFeePerGas` with
//! the next base fee derived from the latest header, and new heads come from a
//! `newHeads` subscription.

use crate::{ChainConnector, ChainError, ChainInterface, HeadStream};
use alloy_provider::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy_pubsub::PubSubFrontend;
use alloy_rpc_types::{Block, BlockNumberOrTag, BlockTransactionsKind};
use alloy_transport::TransportError;
use async_trait::async_trait;
use bench_types::{
	with_0x_prefix, ChainBlock, ChainHeader, ChainKind, FeeCaps, SignedTransaction,
	TransactionHash,
};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;

fn rpc_error(context: &str, err: TransportError) -> ChainError {
	ChainError::Rpc(format!("{}: {}", context, err))
}

fn header_of(block: &Block) -> ChainHeader {
	let header = &block.header.inner;
	ChainHeader {
		number: header.number,
		gas_used: header.gas_used,
		gas_limit: header.gas_limit,
		base_fee_per_gas: header.base_fee_per_gas,
	}
}

/// Alloy-based adapter for one EVM node.
pub struct AlloyChain {
	address: String,
	chain_id: u64,
	/// `None` once closed; dropping the provider shuts the websocket down.
	provider: RwLock<Option<RootProvider<PubSubFrontend>>>,
}

impl AlloyChain {
	/// Dials `ws://{address}` and reads the chain id.
	pub async fn connect(address: &str) -> Result<Self, ChainError> {
		let url = format!("ws://{}", address);
		let provider = ProviderBuilder::new()
			.on_ws(WsConnect::new(url))
			.await
			.map_err(|e| ChainError::Connection(format!("{}: {}", address, e)))?;

		let chain_id = provider
			.get_chain_id()
			.await
			.map_err(|e| ChainError::Connection(format!("{}: {}", address, e)))?;

		tracing::debug!(node = %address, chain_id, "Connected to node");

		Ok(Self {
			address: address.to_string(),
			chain_id,
			provider: RwLock::new(Some(provider)),
		})
	}

	fn provider(&self) -> Result<RootProvider<PubSubFrontend>, ChainError> {
		self.provider.read().clone().ok_or(ChainError::Closed)
	}

	async fn fetch_block(&self, number: BlockNumberOrTag) -> Result<Block, ChainError> {
		self.provider()?
			.get_block_by_number(number, BlockTransactionsKind::Hashes)
			.await
			.map_err(|e| rpc_error("eth_getBlockByNumber", e))?
			.ok_or_else(|| ChainError::Rpc(format!("block {} not found", number)))
	}
}

#[async_trait]
impl ChainInterface for AlloyChain {
	fn address(&self) -> &str {
		&self.address
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn submit(&self, tx: &SignedTransaction) -> Result<TransactionHash, ChainError> {
		let pending = self
			.provider()?
			.send_raw_transaction(&tx.raw)
			.await
			.map_err(|e| ChainError::Rejected(e.to_string()))?;
		Ok(TransactionHash::from(*pending.tx_hash()))
	}

	async fn current_fee_hint(&self) -> Result<FeeCaps, ChainError> {
		let tip = self
			.provider()?
			.get_max_priority_fee_per_gas()
			.await
			.map_err(|e| rpc_error("eth_maxPriorityFeePerGas", e))?;
		let latest = self.fetch_block(BlockNumberOrTag::Latest).await?;
		let next_base_fee = header_of(&latest).next_base_fee();

		Ok(FeeCaps::from_tip_and_base_fee(tip, next_base_fee as u128))
	}

	async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainError> {
		let block = self.fetch_block(BlockNumberOrTag::Number(number)).await?;
		let header = &block.header;

		Ok(ChainBlock {
			hash: with_0x_prefix(&hex::encode(header.hash)),
			number: header.inner.number,
			timestamp: header.inner.timestamp,
			transaction_hashes: block
				.transactions
				.hashes()
				.map(TransactionHash::from)
				.collect(),
		})
	}

	async fn block_height(&self) -> Result<u64, ChainError> {
		self.provider()?
			.get_block_number()
			.await
			.map_err(|e| rpc_error("eth_blockNumber", e))
	}

	async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError> {
		let subscription = self
			.provider()?
			.subscribe_blocks()
			.await
			.map_err(|e| rpc_error("eth_subscribe", e))?;

		let stream = subscription.into_stream().map(|header| ChainHeader {
			number: header.inner.number,
			gas_used: header.inner.gas_used,
			gas_limit: header.inner.gas_limit,
			base_fee_per_gas: header.inner.base_fee_per_gas,
		});
		Ok(stream.boxed())
	}

	async fn close(&self) {
		if self.provider.write().take().is_some() {
			tracing::debug!(node = %self.address, "Closed node connection");
		}
	}
}

/// Connector producing [`AlloyChain`] adapters.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlloyConnector;

#[async_trait]
impl ChainConnector for AlloyConnector {
	fn kind(&self) -> ChainKind {
		ChainKind::Ethereum
	}

	async fn connect(&self, address: &str) -> Result<Arc<dyn ChainInterface>, ChainError> {
		Ok(Arc::new(AlloyChain::connect(address).await?))
	}
}

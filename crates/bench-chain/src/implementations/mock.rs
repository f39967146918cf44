//! In-memory chain used for dry runs and tests.
//!
//! A [`MockNetwork`] is a single chain reachable through any number of
//! [`MockChain`] adapters, the way several RPC nodes front one real network.
//! Submitted transactions wait in a pending pool until a block is mined, either
//! manually with [`MockNetwork::mine`] or on a timer with
//! [`MockNetwork::spawn_miner`]. Every mined block is broadcast to head
//! subscribers. Failure switches let tests make submissions bounce or fee reads
//! fail.

use crate::{ChainConnector, ChainError, ChainInterface, HeadStream};
use async_trait::async_trait;
use bench_types::{
	ChainBlock, ChainHeader, ChainKind, FeeCaps, SignedTransaction, TransactionHash,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Chain id reported by mock adapters.
pub const MOCK_CHAIN_ID: u64 = 31337;

const GAS_LIMIT: u64 = 30_000_000;
const GAS_PER_TX: u64 = 21_000;

fn now_secs() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}

struct Ledger {
	pending: Vec<TransactionHash>,
	blocks: Vec<(ChainBlock, ChainHeader)>,
	tip_cap: u128,
	submitted: u64,
}

impl Ledger {
	fn tip(&self) -> &(ChainBlock, ChainHeader) {
		// Genesis is created with the ledger, so there is always a tip
		&self.blocks[self.blocks.len() - 1]
	}
}

struct Shared {
	ledger: Mutex<Ledger>,
	heads: broadcast::Sender<ChainHeader>,
	reject_submissions: AtomicBool,
	fail_fee_reads: AtomicBool,
	refuse_connections: AtomicBool,
	fee_reads: AtomicU64,
}

/// Handle to an in-memory chain. Clones share the same chain.
#[derive(Clone)]
pub struct MockNetwork {
	shared: Arc<Shared>,
}

impl Default for MockNetwork {
	fn default() -> Self {
		Self::new()
	}
}

impl MockNetwork {
	/// Creates a chain holding only an empty genesis block.
	pub fn new() -> Self {
		let genesis_header = ChainHeader {
			number: 0,
			gas_used: 0,
			gas_limit: GAS_LIMIT,
			base_fee_per_gas: Some(1_000_000_000),
		};
		let genesis = ChainBlock {
			hash: block_hash(0),
			number: 0,
			timestamp: now_secs(),
			transaction_hashes: Vec::new(),
		};
		let (heads, _) = broadcast::channel(1024);

		Self {
			shared: Arc::new(Shared {
				ledger: Mutex::new(Ledger {
					pending: Vec::new(),
					blocks: vec![(genesis, genesis_header)],
					tip_cap: 1_000_000_000,
					submitted: 0,
				}),
				heads,
				reject_submissions: AtomicBool::new(false),
				fail_fee_reads: AtomicBool::new(false),
				refuse_connections: AtomicBool::new(false),
				fee_reads: AtomicU64::new(0),
			}),
		}
	}

	/// Connector handing out adapters to this chain.
	pub fn connector(&self) -> MockConnector {
		MockConnector {
			network: self.clone(),
		}
	}

	/// Mines every pending transaction into a block stamped with the current time.
	pub fn mine(&self) -> ChainBlock {
		self.mine_at(now_secs())
	}

	/// Mines every pending transaction into a block with the given timestamp.
	///
	/// Timestamps never go backwards; an earlier value is raised to the tip's.
	pub fn mine_at(&self, timestamp: u64) -> ChainBlock {
		let (block, header) = {
			let mut ledger = self.shared.ledger.lock();
			let (tip, tip_header) = ledger.tip();
			let number = tip.number + 1;
			let timestamp = timestamp.max(tip.timestamp);
			let base_fee_per_gas = Some(tip_header.next_base_fee());

			let transaction_hashes = std::mem::take(&mut ledger.pending);
			let gas_used = (transaction_hashes.len() as u64)
				.saturating_mul(GAS_PER_TX)
				.min(GAS_LIMIT);

			let block = ChainBlock {
				hash: block_hash(number),
				number,
				timestamp,
				transaction_hashes,
			};
			let header = ChainHeader {
				number,
				gas_used,
				gas_limit: GAS_LIMIT,
				base_fee_per_gas,
			};
			ledger.blocks.push((block.clone(), header));
			(block, header)
		};

		// No subscribers is fine
		let _ = self.shared.heads.send(header);
		block
	}

	/// Mines a block every `interval` until the returned handle is aborted.
	pub fn spawn_miner(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
		let network = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			ticker.tick().await;
			loop {
				ticker.tick().await;
				network.mine();
			}
		})
	}

	/// Makes every later submission fail with [`ChainError::Rejected`].
	pub fn set_reject_submissions(&self, reject: bool) {
		self.shared.reject_submissions.store(reject, Ordering::SeqCst);
	}

	/// Makes every later fee read fail with [`ChainError::Rpc`].
	pub fn set_fail_fee_reads(&self, fail: bool) {
		self.shared.fail_fee_reads.store(fail, Ordering::SeqCst);
	}

	/// Makes every later connection attempt fail.
	pub fn set_refuse_connections(&self, refuse: bool) {
		self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
	}

	/// Sets the priority fee suggested by fee hints.
	pub fn set_tip_cap(&self, tip_cap: u128) {
		self.shared.ledger.lock().tip_cap = tip_cap;
	}

	/// Number of the latest block.
	pub fn height(&self) -> u64 {
		self.shared.ledger.lock().tip().0.number
	}

	/// Transactions waiting for the next block.
	pub fn pending_count(&self) -> usize {
		self.shared.ledger.lock().pending.len()
	}

	/// Transactions accepted since the network was created.
	pub fn submitted_count(&self) -> u64 {
		self.shared.ledger.lock().submitted
	}

	/// Fee hint reads attempted, including failed ones.
	pub fn fee_reads(&self) -> u64 {
		self.shared.fee_reads.load(Ordering::SeqCst)
	}

	fn subscribe(&self) -> broadcast::Receiver<ChainHeader> {
		self.shared.heads.subscribe()
	}
}

fn block_hash(number: u64) -> String {
	format!("0x{:064x}", number)
}

/// Adapter onto a [`MockNetwork`].
pub struct MockChain {
	address: String,
	network: MockNetwork,
	closed: AtomicBool,
}

impl MockChain {
	pub fn new(address: &str, network: MockNetwork) -> Self {
		Self {
			address: address.to_string(),
			network,
			closed: AtomicBool::new(false),
		}
	}

	fn ensure_open(&self) -> Result<(), ChainError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ChainError::Closed);
		}
		Ok(())
	}
}

#[async_trait]
impl ChainInterface for MockChain {
	fn address(&self) -> &str {
		&self.address
	}

	fn chain_id(&self) -> u64 {
		MOCK_CHAIN_ID
	}

	async fn submit(&self, tx: &SignedTransaction) -> Result<TransactionHash, ChainError> {
		self.ensure_open()?;
		if self.network.shared.reject_submissions.load(Ordering::SeqCst) {
			return Err(ChainError::Rejected(format!("{} refused by mock", tx.hash)));
		}

		let mut ledger = self.network.shared.ledger.lock();
		ledger.pending.push(tx.hash.clone());
		ledger.submitted += 1;
		Ok(tx.hash.clone())
	}

	async fn current_fee_hint(&self) -> Result<FeeCaps, ChainError> {
		self.ensure_open()?;
		self.network.shared.fee_reads.fetch_add(1, Ordering::SeqCst);
		if self.network.shared.fail_fee_reads.load(Ordering::SeqCst) {
			return Err(ChainError::Rpc("fee read failed".to_string()));
		}

		let ledger = self.network.shared.ledger.lock();
		let next_base_fee = ledger.tip().1.next_base_fee();
		Ok(FeeCaps::from_tip_and_base_fee(
			ledger.tip_cap,
			next_base_fee as u128,
		))
	}

	async fn block_by_number(&self, number: u64) -> Result<ChainBlock, ChainError> {
		self.ensure_open()?;
		let ledger = self.network.shared.ledger.lock();
		usize::try_from(number)
			.ok()
			.and_then(|idx| ledger.blocks.get(idx))
			.map(|(block, _)| block.clone())
			.ok_or_else(|| ChainError::Rpc(format!("block {} not found", number)))
	}

	async fn block_height(&self) -> Result<u64, ChainError> {
		self.ensure_open()?;
		Ok(self.network.height())
	}

	async fn subscribe_new_heads(&self) -> Result<HeadStream, ChainError> {
		self.ensure_open()?;
		let rx = self.network.subscribe();
		let stream = futures::stream::unfold(rx, |mut rx| async move {
			loop {
				match rx.recv().await {
					Ok(header) => return Some((header, rx)),
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "Mock head subscriber lagged");
					}
					Err(broadcast::error::RecvError::Closed) => return None,
				}
			}
		});
		Ok(stream.boxed())
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}
}

/// Connector producing [`MockChain`] adapters onto one network.
#[derive(Clone)]
pub struct MockConnector {
	network: MockNetwork,
}

#[async_trait]
impl ChainConnector for MockConnector {
	fn kind(&self) -> ChainKind {
		ChainKind::Mock
	}

	async fn connect(&self, address: &str) -> Result<Arc<dyn ChainInterface>, ChainError> {
		if self.network.shared.refuse_connections.load(Ordering::SeqCst) {
			return Err(ChainError::Connection(format!("{} refused", address)));
		}
		Ok(Arc::new(MockChain::new(address, self.network.clone())))
	}
}

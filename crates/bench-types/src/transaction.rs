//! Transaction types for the benchmark.
//!
//! Transactions enter the secondary as unsigned descriptors produced by the
//! workload generator, are priced with the current fee caps of the selected
//! endpoint, signed, and submitted as raw EIP-2718 payloads.

use crate::{with_0x_prefix, FeeCaps};
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain transaction hash representation.
///
/// Stores transaction hashes as raw bytes to support different blockchain formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", with_0x_prefix(&hex::encode(&self.0)))
	}
}

impl From<B256> for TransactionHash {
	fn from(hash: B256) -> Self {
		Self(hash.to_vec())
	}
}

/// Unsigned transaction descriptor as found in a workload shard.
///
/// Fee fields are normally absent in the workload; they are filled from the
/// fee cap cache of the endpoint the transaction is dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
	/// Sender, used to pick the signing key.
	pub from: Address,
	/// Recipient; `None` for contract creation.
	#[serde(default)]
	pub to: Option<Address>,
	pub nonce: u64,
	pub gas_limit: u64,
	#[serde(default)]
	pub value: U256,
	#[serde(default)]
	pub input: Bytes,
	/// Chain id; overwritten with the endpoint's chain id at dispatch.
	#[serde(default)]
	pub chain_id: Option<u64>,
	#[serde(default)]
	pub max_priority_fee_per_gas: u128,
	#[serde(default)]
	pub max_fee_per_gas: u128,
}

impl UnsignedTransaction {
	/// Applies a fee cap pair to this transaction.
	pub fn apply_fee_caps(&mut self, caps: FeeCaps) {
		self.max_priority_fee_per_gas = caps.tip_cap;
		self.max_fee_per_gas = caps.fee_cap;
	}
}

/// A signed transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	/// Hash the chain will assign to this transaction.
	pub hash: TransactionHash,
	/// EIP-2718 encoded payload.
	pub raw: Bytes,
}

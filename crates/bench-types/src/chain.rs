//! Chain-facing types shared by adapters and the benchmark engine.
//!
//! These types are the adapter-neutral view of what the engine needs from a
//! chain: block contents for confirmation scanning, head notifications for
//! fee refreshes, and the fee cap pair attached to every submission.

use crate::TransactionHash;
use alloy_eips::eip1559::{calc_next_block_base_fee, BaseFeeParams};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Blockchain family selected by the primary with the BLOCKCHAIN command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
	/// EVM chains with EIP-1559 dynamic fees.
	Ethereum,
	/// In-memory network used for dry runs and tests.
	Mock,
}

impl ChainKind {
	/// Wire selector for this chain kind.
	pub fn as_byte(self) -> u8 {
		match self {
			ChainKind::Ethereum => 0x01,
			ChainKind::Mock => 0x7f,
		}
	}

	/// Decodes a wire selector, returning `None` for unknown values.
	pub fn from_byte(byte: u8) -> Option<Self> {
		match byte {
			0x01 => Some(ChainKind::Ethereum),
			0x7f => Some(ChainKind::Mock),
			_ => None,
		}
	}
}

impl fmt::Display for ChainKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChainKind::Ethereum => write!(f, "ethereum"),
			ChainKind::Mock => write!(f, "mock"),
		}
	}
}

/// Fee bid attached to a dynamic-fee transaction, in wei.
///
/// Caps are compared by their total fee cap only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCaps {
	/// Priority fee (tip) per gas.
	pub tip_cap: u128,
	/// Maximum total fee per gas.
	pub fee_cap: u128,
}

impl FeeCaps {
	pub fn new(tip_cap: u128, fee_cap: u128) -> Self {
		Self { tip_cap, fee_cap }
	}

	/// Derives caps from a suggested tip and the expected next base fee.
	///
	/// The fee cap leaves room for the base fee to double before the
	/// transaction becomes unincludable.
	pub fn from_tip_and_base_fee(tip_cap: u128, next_base_fee: u128) -> Self {
		Self {
			tip_cap,
			fee_cap: tip_cap.saturating_add(next_base_fee.saturating_mul(2)),
		}
	}

	/// Orders two cap pairs by total fee cap.
	pub fn cmp_fee_cap(&self, other: &FeeCaps) -> Ordering {
		self.fee_cap.cmp(&other.fee_cap)
	}
}

/// New-head notification as delivered by a chain subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeader {
	pub number: u64,
	pub gas_used: u64,
	pub gas_limit: u64,
	/// Base fee of this block; `None` before London.
	pub base_fee_per_gas: Option<u64>,
}

impl ChainHeader {
	/// Base fee expected for the block following this header.
	pub fn next_base_fee(&self) -> u64 {
		match self.base_fee_per_gas {
			Some(base_fee) => calc_next_block_base_fee(
				self.gas_used,
				self.gas_limit,
				base_fee,
				BaseFeeParams::ethereum(),
			),
			None => 0,
		}
	}
}

/// Block contents relevant to confirmation tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBlock {
	/// Block hash, `0x`-prefixed hex.
	pub hash: String,
	pub number: u64,
	/// Block timestamp in seconds since the UNIX epoch.
	pub timestamp: u64,
	pub transaction_hashes: Vec<TransactionHash>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_chain_kind_selector_round_trip() {
		for kind in [ChainKind::Ethereum, ChainKind::Mock] {
			assert_eq!(ChainKind::from_byte(kind.as_byte()), Some(kind));
		}
		assert_eq!(ChainKind::from_byte(0x42), None);
	}

	#[test]
	fn test_fee_caps_from_base_fee() {
		let caps = FeeCaps::from_tip_and_base_fee(2, 100);
		assert_eq!(caps.tip_cap, 2);
		assert_eq!(caps.fee_cap, 202);
	}

	#[test]
	fn test_fee_caps_order_by_fee_cap_only() {
		let low = FeeCaps::new(50, 100);
		let high = FeeCaps::new(1, 101);
		assert_eq!(low.cmp_fee_cap(&high), Ordering::Less);
		assert_eq!(FeeCaps::new(3, 100).cmp_fee_cap(&low), Ordering::Equal);
	}

	#[test]
	fn test_next_base_fee_at_target_is_unchanged() {
		let header = ChainHeader {
			number: 10,
			gas_used: 15_000_000,
			gas_limit: 30_000_000,
			base_fee_per_gas: Some(1_000_000_000),
		};
		assert_eq!(header.next_base_fee(), 1_000_000_000);
	}

	#[test]
	fn test_next_base_fee_rises_on_full_block() {
		let header = ChainHeader {
			number: 10,
			gas_used: 30_000_000,
			gas_limit: 30_000_000,
			base_fee_per_gas: Some(1_000_000_000),
		};
		assert_eq!(header.next_base_fee(), 1_125_000_000);
	}

	#[test]
	fn test_next_base_fee_without_london() {
		let header = ChainHeader {
			number: 1,
			gas_used: 0,
			gas_limit: 30_000_000,
			base_fee_per_gas: None,
		};
		assert_eq!(header.next_base_fee(), 0);
	}
}

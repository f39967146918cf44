//! Local key signing.
//!
//! Holds one in-memory private key per configured account and signs EIP-1559
//! transactions offline, so submission never waits on a node-side wallet.

use crate::{AccountError, AccountInterface};
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use bench_config::KeyConfig;
use bench_types::{truncate_id, SignedTransaction, UnsignedTransaction};
use std::collections::HashMap;

/// Signs with private keys held in memory, selected by sender address.
pub struct LocalAccount {
	signers: HashMap<Address, PrivateKeySigner>,
}

impl LocalAccount {
	pub fn new(signers: impl IntoIterator<Item = PrivateKeySigner>) -> Self {
		let signers = signers
			.into_iter()
			.map(|signer| (signer.address(), signer))
			.collect();
		Self { signers }
	}

	fn signer_for(&self, from: &Address) -> Result<&PrivateKeySigner, AccountError> {
		self.signers
			.get(from)
			.ok_or(AccountError::UnknownSender(*from))
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn addresses(&self) -> Vec<Address> {
		self.signers.keys().copied().collect()
	}

	async fn sign_transaction(
		&self,
		tx: &UnsignedTransaction,
	) -> Result<SignedTransaction, AccountError> {
		let signer = self.signer_for(&tx.from)?;
		let chain_id = tx.chain_id.ok_or_else(|| {
			AccountError::SigningFailed(format!("transaction {} has no chain id", tx.nonce))
		})?;

		let mut request = TxEip1559 {
			chain_id,
			nonce: tx.nonce,
			gas_limit: tx.gas_limit,
			max_fee_per_gas: tx.max_fee_per_gas,
			max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
			to: tx.to.map(TxKind::Call).unwrap_or(TxKind::Create),
			value: tx.value,
			access_list: Default::default(),
			input: tx.input.clone(),
		};

		let signature = signer
			.sign_transaction_sync(&mut request)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		let signed = request.into_signed(signature);
		let hash = *signed.hash();
		let raw = TxEnvelope::from(signed).encoded_2718();

		Ok(SignedTransaction {
			hash: hash.into(),
			raw: Bytes::from(raw),
		})
	}
}

/// Builds a local account from the configured keys.
///
/// Every key must parse and must belong to the address it is listed under.
pub fn create_account(keys: &[KeyConfig]) -> Result<Box<dyn AccountInterface>, AccountError> {
	let mut signers = Vec::with_capacity(keys.len());

	for key in keys {
		let expected: Address = key
			.address
			.parse()
			.map_err(|e| AccountError::InvalidKey(format!("bad address {}: {}", key.address, e)))?;
		let signer: PrivateKeySigner = key
			.private_key
			.with_exposed(|k| k.parse::<PrivateKeySigner>())
			.map_err(|e| AccountError::InvalidKey(format!("key for {}: {}", key.address, e)))?;

		if signer.address() != expected {
			return Err(AccountError::InvalidKey(format!(
				"key does not belong to {}",
				key.address
			)));
		}

		tracing::debug!(account = %truncate_id(&key.address), "Loaded signing key");
		signers.push(signer);
	}

	Ok(Box::new(LocalAccount::new(signers)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{keccak256, U256};
	use bench_types::TransactionHash;

	const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const ADDR_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
	const ADDR_1: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

	fn key_config(address: &str, key: &str) -> KeyConfig {
		KeyConfig {
			address: address.to_string(),
			private_key: key.into(),
		}
	}

	fn transfer(from: &str, nonce: u64) -> UnsignedTransaction {
		UnsignedTransaction {
			from: from.parse().unwrap(),
			to: Some(ADDR_1.parse().unwrap()),
			nonce,
			gas_limit: 21_000,
			value: U256::from(1u64),
			input: Bytes::new(),
			chain_id: Some(31337),
			max_priority_fee_per_gas: 1_000_000_000,
			max_fee_per_gas: 3_000_000_000,
		}
	}

	#[tokio::test]
	async fn test_signed_hash_matches_payload() {
		let account = create_account(&[key_config(ADDR_0, KEY_0)]).unwrap();
		let signed = account.sign_transaction(&transfer(ADDR_0, 0)).await.unwrap();

		// Typed envelope starts with the EIP-1559 type byte
		assert_eq!(signed.raw[0], 0x02);
		assert_eq!(
			signed.hash,
			TransactionHash::from(keccak256(&signed.raw))
		);
	}

	#[tokio::test]
	async fn test_distinct_nonces_give_distinct_hashes() {
		let account = create_account(&[key_config(ADDR_0, KEY_0)]).unwrap();
		let a = account.sign_transaction(&transfer(ADDR_0, 0)).await.unwrap();
		let b = account.sign_transaction(&transfer(ADDR_0, 1)).await.unwrap();
		assert_ne!(a.hash, b.hash);
	}

	#[tokio::test]
	async fn test_unknown_sender() {
		let account = create_account(&[key_config(ADDR_0, KEY_0)]).unwrap();
		let result = account.sign_transaction(&transfer(ADDR_1, 0)).await;
		assert!(matches!(result, Err(AccountError::UnknownSender(_))));
	}

	#[tokio::test]
	async fn test_missing_chain_id() {
		let account = create_account(&[key_config(ADDR_0, KEY_0)]).unwrap();
		let mut tx = transfer(ADDR_0, 0);
		tx.chain_id = None;
		let result = account.sign_transaction(&tx).await;
		assert!(matches!(result, Err(AccountError::SigningFailed(_))));
	}

	#[test]
	fn test_key_address_mismatch() {
		let result = create_account(&[key_config(ADDR_1, KEY_0)]);
		assert!(matches!(result, Err(AccountError::InvalidKey(_))));
	}

	#[test]
	fn test_malformed_key() {
		let result = create_account(&[key_config(ADDR_0, "0x1234")]);
		assert!(matches!(result, Err(AccountError::InvalidKey(_))));
	}

	#[test]
	fn test_addresses() {
		let account = create_account(&[key_config(ADDR_0, KEY_0)]).unwrap();
		assert_eq!(account.addresses(), vec![ADDR_0.parse::<Address>().unwrap()]);
	}
}

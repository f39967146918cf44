//! Signing capability for the benchmark secondary.
//!
//! Workload transactions arrive unsigned because their fee caps are only known
//! at dispatch time. This module defines the interface used to turn a priced
//! descriptor into a signed, encoded transaction, and the service wrapper the
//! dispatch engine holds.

use alloy_primitives::Address;
use async_trait::async_trait;
use bench_types::{SignedTransaction, UnsignedTransaction};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// No key is configured for the transaction sender.
	#[error("No key configured for sender {0}")]
	UnknownSender(Address),
}

/// Trait defining the interface for signing implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Addresses this implementation can sign for.
	fn addresses(&self) -> Vec<Address>;

	/// Signs a fully priced transaction on behalf of its sender.
	///
	/// Returns the encoded payload together with the hash the chain will
	/// assign to it.
	async fn sign_transaction(
		&self,
		tx: &UnsignedTransaction,
	) -> Result<SignedTransaction, AccountError>;
}

/// Service that wraps the configured signing implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Addresses the underlying implementation holds keys for.
	pub fn addresses(&self) -> Vec<Address> {
		self.implementation.addresses()
	}

	/// Signs a transaction using the underlying implementation.
	pub async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, AccountError> {
		self.implementation.sign_transaction(tx).await
	}
}

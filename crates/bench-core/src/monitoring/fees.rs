//! Periodic fee cap refresh, one task per endpoint.

use crate::endpoint::Endpoint;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Polls an endpoint's fee hint until its stop flag is set.
pub struct FeePoller {
	endpoint: Arc<Endpoint>,
	interval: Duration,
	retry_backoff: Duration,
}

impl FeePoller {
	pub fn new(endpoint: Arc<Endpoint>, interval: Duration, retry_backoff: Duration) -> Self {
		Self {
			endpoint,
			interval,
			retry_backoff,
		}
	}

	/// Reads the fee hint once and proposes it. Returns whether the read succeeded.
	pub async fn refresh(&self) -> bool {
		let observed_at = Utc::now();
		match self.endpoint.fee_hint().await {
			Ok(caps) => {
				if self.endpoint.fees().propose(caps, observed_at) {
					tracing::debug!(
						node = %self.endpoint.address(),
						fee_cap = caps.fee_cap,
						tip_cap = caps.tip_cap,
						"Updated fee caps from polling"
					);
				}
				true
			}
			Err(e) => {
				tracing::debug!(node = %self.endpoint.address(), error = %e, "Fee poll failed");
				false
			}
		}
	}

	/// Runs until the endpoint is stopped.
	///
	/// A failed read leaves the cache alone and retries after the short backoff.
	pub async fn run(self) {
		while !self.endpoint.is_stopped() {
			let pause = if self.refresh().await {
				self.interval
			} else {
				self.retry_backoff
			};
			tokio::time::sleep(pause).await;
		}
		tracing::debug!(node = %self.endpoint.address(), "Fee poller stopped");
	}

	pub fn spawn(self) -> tokio::task::JoinHandle<()> {
		tokio::spawn(self.run())
	}
}

//! Per-endpoint fee cap cache.
//!
//! Two sources refresh the cache concurrently: the endpoint's own poller and
//! the head watcher. A proposal only takes effect when it bids higher than the
//! stored caps and was observed after them, so a slow read that finishes late
//! cannot replace a fresher value.

use bench_types::FeeCaps;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;

#[derive(Debug, Default)]
struct FeeState {
	caps: FeeCaps,
	observed_at: Option<DateTime<Utc>>,
}

/// Last accepted fee caps of one endpoint. Starts at zero caps.
#[derive(Debug, Default)]
pub struct FeeCapCache {
	state: RwLock<FeeState>,
}

impl FeeCapCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Caps to attach to a transaction sent now.
	pub fn current(&self) -> FeeCaps {
		self.state.read().caps
	}

	/// Observation time of the current caps, `None` before the first update.
	pub fn observed_at(&self) -> Option<DateTime<Utc>> {
		self.state.read().observed_at
	}

	/// Replaces the caps if `candidate` bids higher and was observed later.
	///
	/// Returns whether the cache changed.
	pub fn propose(&self, candidate: FeeCaps, observed_at: DateTime<Utc>) -> bool {
		let mut state = self.state.write();

		let newer = state.observed_at.is_none_or(|prev| observed_at > prev);
		let higher = candidate.cmp_fee_cap(&state.caps) == Ordering::Greater;
		if !(newer && higher) {
			return false;
		}

		state.caps = candidate;
		state.observed_at = Some(observed_at);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn test_starts_at_zero() {
		let cache = FeeCapCache::new();
		assert_eq!(cache.current(), FeeCaps::default());
		assert!(cache.observed_at().is_none());
	}

	#[test]
	fn test_accepts_higher_and_newer() {
		let cache = FeeCapCache::new();
		let t0 = Utc::now();

		assert!(cache.propose(FeeCaps::new(1, 100), t0));
		assert!(cache.propose(FeeCaps::new(1, 150), t0 + Duration::milliseconds(1)));
		assert_eq!(cache.current(), FeeCaps::new(1, 150));
	}

	#[test]
	fn test_rejects_lower_or_equal() {
		let cache = FeeCapCache::new();
		let t0 = Utc::now();
		cache.propose(FeeCaps::new(1, 100), t0);

		assert!(!cache.propose(FeeCaps::new(9, 90), t0 + Duration::seconds(1)));
		assert!(!cache.propose(FeeCaps::new(9, 100), t0 + Duration::seconds(1)));
		assert_eq!(cache.current(), FeeCaps::new(1, 100));
	}

	#[test]
	fn test_rejects_out_of_order_observation() {
		let cache = FeeCapCache::new();
		let t0 = Utc::now();
		cache.propose(FeeCaps::new(1, 100), t0);

		// Larger bid, but observed before the stored one
		assert!(!cache.propose(FeeCaps::new(1, 500), t0 - Duration::milliseconds(5)));
		assert!(!cache.propose(FeeCaps::new(1, 500), t0));
		assert_eq!(cache.current(), FeeCaps::new(1, 100));
		assert_eq!(cache.observed_at(), Some(t0));
	}

	#[test]
	fn test_final_value_is_best_in_order_proposal() {
		let cache = FeeCapCache::new();
		let t0 = Utc::now();
		let proposals = [
			(FeeCaps::new(1, 10), t0 + Duration::milliseconds(1)),
			(FeeCaps::new(1, 30), t0 + Duration::milliseconds(3)),
			(FeeCaps::new(1, 50), t0 + Duration::milliseconds(2)),
			(FeeCaps::new(1, 40), t0 + Duration::milliseconds(4)),
		];
		for (caps, at) in proposals {
			cache.propose(caps, at);
		}
		assert_eq!(cache.current().fee_cap, 40);
	}

	#[test]
	fn test_concurrent_proposals_keep_maximum() {
		let cache = std::sync::Arc::new(FeeCapCache::new());
		let base = Utc::now();

		let handles: Vec<_> = (1..=8u128)
			.map(|i| {
				let cache = cache.clone();
				std::thread::spawn(move || {
					for j in 0..100u128 {
						let fee = i * 1000 + j;
						cache.propose(
							FeeCaps::new(1, fee),
							base + Duration::microseconds(fee as i64),
						);
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(cache.current().fee_cap, 8099);
	}
}

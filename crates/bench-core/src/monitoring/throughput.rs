//! Per-window throughput sampling.

use crate::metrics::RunMetrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Records the cumulative confirmation count once per window.
pub struct ThroughputSampler {
	series: Arc<Mutex<Vec<u64>>>,
	task: JoinHandle<()>,
}

impl ThroughputSampler {
	pub fn start(metrics: Arc<RunMetrics>, window: Duration) -> Self {
		let series = Arc::new(Mutex::new(Vec::new()));
		let samples = series.clone();

		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(window);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// First tick completes immediately
			ticker.tick().await;
			loop {
				ticker.tick().await;
				samples.lock().push(metrics.confirmed());
			}
		});

		Self { series, task }
	}

	/// Stops sampling and returns the cumulative series.
	pub fn stop(self) -> Vec<u64> {
		self.task.abort();
		let series = self.series.lock().clone();
		series
	}
}

/// Converts a cumulative series into per-window deltas.
///
/// The first sample is kept as is. A sample lower than its predecessor yields 0.
pub fn per_window(series: &[u64]) -> Vec<f64> {
	let mut previous = 0;
	series
		.iter()
		.map(|&sample| {
			let delta = sample.saturating_sub(previous);
			previous = sample;
			delta as f64
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_per_window_deltas() {
		assert_eq!(per_window(&[5, 5, 12, 20]), vec![5.0, 0.0, 7.0, 8.0]);
	}

	#[test]
	fn test_per_window_saturates() {
		assert_eq!(per_window(&[4, 2, 3]), vec![4.0, 0.0, 1.0]);
		assert!(per_window(&[]).is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_sampler_records_each_window() {
		let metrics = Arc::new(RunMetrics::new());
		let sampler = ThroughputSampler::start(metrics.clone(), Duration::from_secs(1));

		tokio::time::sleep(Duration::from_millis(1500)).await;
		metrics.record_confirmation();
		metrics.record_confirmation();
		tokio::time::sleep(Duration::from_millis(1000)).await;

		assert_eq!(sampler.stop(), vec![0, 2]);
	}
}

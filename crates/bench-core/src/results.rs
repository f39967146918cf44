//! Reduction of a run's records into the result summary.

use crate::metrics::MetricsSnapshot;
use crate::monitoring::per_window;
use crate::tracker::TransactionRecord;
use bench_types::BenchResults;
use chrono::{DateTime, Utc};

/// Builds the result summary of a run.
///
/// Latency comes from confirmed records only and is clamped at zero, since a
/// block timestamp has second precision and may precede the send time. The
/// run ends at the latest confirmation or the latest send, whichever comes
/// last. Failed records are already counted in
/// `metrics.failed`; records still pending count as failures too.
pub fn aggregate(
	records: &[TransactionRecord],
	series: &[u64],
	start: DateTime<Utc>,
	metrics: MetricsSnapshot,
) -> BenchResults {
	let mut tx_latencies = Vec::new();
	let mut end = start;
	let mut pending = 0u64;

	for record in records {
		end = end.max(record.sent_at());
		match *record {
			TransactionRecord::Confirmed {
				sent_at,
				confirmed_at,
			} => {
				tx_latencies.push(millis_between(sent_at, confirmed_at));
				end = end.max(confirmed_at);
			}
			TransactionRecord::Pending { .. } => pending += 1,
			TransactionRecord::Failed { .. } => {}
		}
	}

	let average_latency = if tx_latencies.is_empty() {
		0.0
	} else {
		tx_latencies.iter().sum::<f64>() / tx_latencies.len() as f64
	};

	let duration_secs = millis_between(start, end) / 1000.0;
	let throughput = if !tx_latencies.is_empty() && duration_secs > 0.0 {
		metrics.completed.saturating_sub(metrics.failed) as f64 / duration_secs
	} else {
		0.0
	};

	BenchResults {
		success: tx_latencies.len() as u64,
		fail: metrics.failed + pending,
		tx_latencies,
		average_latency,
		throughput,
		throughput_seconds: per_window(series),
	}
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
	let micros = (to - from).num_microseconds().unwrap_or(i64::MAX);
	(micros as f64 / 1000.0).max(0.0)
}

//! Configuration module for the benchmark secondary.
//!
//! This module provides the structures used to configure a secondary: where the
//! primary listens, which chain nodes to drive and with which keys, and the
//! tuning knobs of the dispatch and tracking machinery. Configuration is loaded
//! from a TOML file in which `${VAR}` and `${VAR:-default}` references are
//! resolved from the environment before parsing.

use bench_types::{ChainKind, SecretString};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for a benchmark secondary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this secondary and how it reaches the primary.
	pub secondary: SecondaryConfig,
	/// Chain nodes and signing keys.
	pub chain: ChainConfig,
	/// Dispatch, tracking and protocol tuning.
	#[serde(default)]
	pub benchmark: BenchmarkConfig,
}

/// Configuration of the secondary process itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecondaryConfig {
	/// `host:port` of the primary's control listener.
	pub primary_address: String,
	/// Chain family this secondary is built to drive.
	pub chain: ChainKind,
}

/// Chain nodes and accounts used by the benchmark.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Node addresses (`host:port`), dialled over websocket.
	pub nodes: Vec<String>,
	/// Accounts whose transactions appear in the workload.
	#[serde(default)]
	pub keys: Vec<KeyConfig>,
}

/// One signing account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyConfig {
	/// Account address, `0x`-prefixed.
	pub address: String,
	/// Hex-encoded private key.
	pub private_key: SecretString,
}

/// Tuning of the benchmark engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchmarkConfig {
	/// Length of a workload interval and of a throughput sampling window.
	#[serde(default = "default_window_seconds")]
	pub window_seconds: u64,
	/// Delay between successful fee cap polls of an endpoint.
	#[serde(default = "default_fee_poll_interval_ms")]
	pub fee_poll_interval_ms: u64,
	/// Delay before retrying a failed fee cap poll.
	#[serde(default = "default_fee_retry_backoff_ms")]
	pub fee_retry_backoff_ms: u64,
	/// Upper bound for any single chain adapter call.
	#[serde(default = "default_rpc_timeout_seconds")]
	pub rpc_timeout_seconds: u64,
	/// Maximum number of submissions in flight at once.
	#[serde(default = "default_max_in_flight")]
	pub max_in_flight: usize,
	/// Maximum number of concurrent block fetches while scanning.
	#[serde(default = "default_max_block_scans")]
	pub max_block_scans: usize,
	/// How long to wait for outstanding confirmations after the last interval.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
	/// How long the body of a WORKLOAD command may take to arrive.
	#[serde(default = "default_workload_read_timeout_seconds")]
	pub workload_read_timeout_seconds: u64,
	/// Largest accepted WORKLOAD body.
	#[serde(default = "default_max_workload_bytes")]
	pub max_workload_bytes: u64,
	/// Scan the blocks produced during the run for missed confirmations.
	#[serde(default = "default_backfill")]
	pub backfill: bool,
}

fn default_window_seconds() -> u64 {
	1
}

fn default_fee_poll_interval_ms() -> u64 {
	500
}

fn default_fee_retry_backoff_ms() -> u64 {
	50
}

fn default_rpc_timeout_seconds() -> u64 {
	10
}

fn default_max_in_flight() -> usize {
	1024
}

fn default_max_block_scans() -> usize {
	16
}

fn default_confirmation_timeout_seconds() -> u64 {
	30
}

fn default_workload_read_timeout_seconds() -> u64 {
	30
}

fn default_max_workload_bytes() -> u64 {
	256 * 1024 * 1024 // 256MB
}

fn default_backfill() -> bool {
	true
}

impl Default for BenchmarkConfig {
	fn default() -> Self {
		Self {
			window_seconds: default_window_seconds(),
			fee_poll_interval_ms: default_fee_poll_interval_ms(),
			fee_retry_backoff_ms: default_fee_retry_backoff_ms(),
			rpc_timeout_seconds: default_rpc_timeout_seconds(),
			max_in_flight: default_max_in_flight(),
			max_block_scans: default_max_block_scans(),
			confirmation_timeout_seconds: default_confirmation_timeout_seconds(),
			workload_read_timeout_seconds: default_workload_read_timeout_seconds(),
			max_workload_bytes: default_max_workload_bytes(),
			backfill: default_backfill(),
		}
	}
}

impl BenchmarkConfig {
	pub fn window(&self) -> Duration {
		Duration::from_secs(self.window_seconds)
	}

	pub fn fee_poll_interval(&self) -> Duration {
		Duration::from_millis(self.fee_poll_interval_ms)
	}

	pub fn fee_retry_backoff(&self) -> Duration {
		Duration::from_millis(self.fee_retry_backoff_ms)
	}

	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_secs(self.rpc_timeout_seconds)
	}

	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_seconds)
	}

	pub fn workload_read_timeout(&self) -> Duration {
		Duration::from_secs(self.workload_read_timeout_seconds)
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.secondary.primary_address.is_empty() {
			return Err(ConfigError::Validation(
				"Primary address cannot be empty".into(),
			));
		}

		if self.chain.nodes.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain node must be configured".into(),
			));
		}
		if let Some(node) = self.chain.nodes.iter().find(|n| n.trim().is_empty()) {
			return Err(ConfigError::Validation(format!(
				"Invalid chain node address '{}'",
				node
			)));
		}

		if self.secondary.chain == ChainKind::Ethereum && self.chain.keys.is_empty() {
			return Err(ConfigError::Validation(
				"At least one signing key is required for ethereum".into(),
			));
		}
		for key in &self.chain.keys {
			if key.address.is_empty() || key.private_key.is_empty() {
				return Err(ConfigError::Validation(
					"Signing keys need both address and private_key".into(),
				));
			}
		}

		let bench = &self.benchmark;
		if bench.window_seconds == 0 {
			return Err(ConfigError::Validation(
				"window_seconds must be greater than 0".into(),
			));
		}
		if bench.fee_poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"fee_poll_interval_ms must be greater than 0".into(),
			));
		}
		if bench.rpc_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"rpc_timeout_seconds must be greater than 0".into(),
			));
		}
		if bench.max_in_flight == 0 {
			return Err(ConfigError::Validation(
				"max_in_flight must be greater than 0".into(),
			));
		}
		if bench.max_block_scans == 0 {
			return Err(ConfigError::Validation(
				"max_block_scans must be greater than 0".into(),
			));
		}
		if bench.max_workload_bytes == 0 {
			return Err(ConfigError::Validation(
				"max_workload_bytes must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from TOML, resolving environment variables and
/// validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

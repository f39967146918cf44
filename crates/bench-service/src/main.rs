//! Main entry point for a benchmark secondary.
//!
//! The secondary loads its configuration, dials the primary's control
//! listener and then does whatever the primary asks: connect to the chain
//! nodes, replay a workload, and report latency and throughput.

use bench_account::implementations::local::create_account;
use bench_account::AccountService;
use bench_chain::implementations::evm::alloy::AlloyConnector;
use bench_chain::implementations::mock::MockNetwork;
use bench_chain::ChainConnector;
use bench_config::Config;
use bench_core::{BenchEngine, Secondary};
use bench_types::ChainKind;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Block time of the in-memory chain used with `chain = "mock"`.
const MOCK_BLOCK_TIME: Duration = Duration::from_secs(1);

/// Command-line arguments for the secondary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Primary address (host:port), overriding the configuration file
	#[arg(short, long, env = "BENCH_PRIMARY")]
	primary: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started secondary");

	let config = load_config(&args).await?;
	tracing::info!(
		chain = %config.secondary.chain,
		nodes = config.chain.nodes.len(),
		"Loaded configuration"
	);

	let account = Arc::new(AccountService::new(create_account(&config.chain.keys)?));
	let (connector, miner) = build_connector(config.secondary.chain);

	let primary = config.secondary.primary_address.clone();
	let stream = TcpStream::connect(&primary).await?;
	stream.set_nodelay(true)?;
	tracing::info!(primary = %primary, "Connected to primary");

	let engine = BenchEngine::new(config, connector, account);
	let result = Secondary::new(stream, engine).run().await;

	if let Some(miner) = miner {
		miner.abort();
	}
	result?;

	tracing::info!("Stopped secondary");
	Ok(())
}

async fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
	let path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let mut config = Config::from_file(path).await?;
	if let Some(primary) = &args.primary {
		config.secondary.primary_address = primary.clone();
	}
	Ok(config)
}

/// Picks the chain connector for `kind`.
///
/// The mock chain lives in this process, so it comes with a miner task.
fn build_connector(kind: ChainKind) -> (Arc<dyn ChainConnector>, Option<JoinHandle<()>>) {
	match kind {
		ChainKind::Ethereum => (Arc::new(AlloyConnector), None),
		ChainKind::Mock => {
			let network = MockNetwork::new();
			let miner = network.spawn_miner(MOCK_BLOCK_TIME);
			(Arc::new(network.connector()), Some(miner))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const CONFIG: &str = r#"
		[secondary]
		primary_address = "127.0.0.1:5000"
		chain = "mock"

		[chain]
		nodes = ["node-0"]
	"#;

	#[test]
	fn test_args_defaults() {
		let args = Args::try_parse_from(["secondary"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_override() {
		let args = Args::try_parse_from([
			"secondary",
			"--config",
			"bench.toml",
			"-l",
			"debug",
			"--primary",
			"10.0.0.1:7000",
		])
		.unwrap();
		assert_eq!(args.config, PathBuf::from("bench.toml"));
		assert_eq!(args.log_level, "debug");
		assert_eq!(args.primary.as_deref(), Some("10.0.0.1:7000"));
	}

	#[tokio::test]
	async fn test_primary_flag_overrides_config() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(CONFIG.as_bytes()).unwrap();

		let args = Args {
			config: file.path().to_path_buf(),
			log_level: "info".into(),
			primary: Some("10.0.0.1:7000".into()),
		};
		let config = load_config(&args).await.unwrap();
		assert_eq!(config.secondary.primary_address, "10.0.0.1:7000");
		assert_eq!(config.secondary.chain, ChainKind::Mock);
	}

	#[tokio::test]
	async fn test_mock_connector_comes_with_miner() {
		let (connector, miner) = build_connector(ChainKind::Mock);
		assert_eq!(connector.kind(), ChainKind::Mock);
		let miner = miner.unwrap();
		miner.abort();

		let (connector, miner) = build_connector(ChainKind::Ethereum);
		assert_eq!(connector.kind(), ChainKind::Ethereum);
		assert!(miner.is_none());
	}
}

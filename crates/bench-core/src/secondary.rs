//! Command loop of a secondary.
//!
//! Reads commands from the primary one at a time, checks them against the
//! protocol state, hands them to the [`BenchEngine`] and answers each with
//! exactly one reply. Only a broken control connection ends the loop early.

use crate::engine::BenchEngine;
use crate::state::{CommandKind, SecondaryState, SecondaryStateMachine};
use bench_comms::{Command, CommsError, ControlConnection};
use bench_types::ChainKind;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum SecondaryError {
	#[error("Control connection failed: {0}")]
	Comms(#[from] CommsError),
}

/// Reply to send for a handled command.
enum Outcome {
	Ok,
	Data(Vec<u8>),
	Err(String),
}

pub struct Secondary<S> {
	connection: ControlConnection<S>,
	engine: BenchEngine,
	state: SecondaryStateMachine,
}

impl<S> Secondary<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S, engine: BenchEngine) -> Self {
		Self {
			connection: ControlConnection::new(stream),
			engine,
			state: SecondaryStateMachine::new(),
		}
	}

	pub fn state(&self) -> SecondaryState {
		self.state.state()
	}

	/// Serves commands until FIN or until the control connection fails.
	///
	/// Everything the engine holds is released before returning.
	pub async fn run(mut self) -> Result<(), SecondaryError> {
		tracing::info!("Waiting for commands");

		loop {
			let command = match self.connection.read_command().await {
				Ok(command) => command,
				Err(e) => {
					tracing::error!(error = %e, state = ?self.state.state(), "Failed to read command");
					self.engine.shutdown().await;
					return Err(e.into());
				}
			};
			tracing::debug!(command = command.name(), "Received command");

			let replied = match self.handle(command).await {
				Ok(Outcome::Ok) => self.connection.reply_ok().await,
				Ok(Outcome::Data(payload)) => self.connection.reply_data(&payload).await,
				Ok(Outcome::Err(message)) => {
					tracing::warn!(command = command.name(), "{}", message);
					self.connection.reply_err(&message).await
				}
				Err(e) => Err(e),
			};
			if let Err(e) = replied {
				tracing::error!(error = %e, "Control connection failed");
				self.engine.shutdown().await;
				return Err(e.into());
			}

			if self.state.state() == SecondaryState::Finished {
				break;
			}
		}

		tracing::info!("Benchmark finished");
		Ok(())
	}

	async fn handle(&mut self, command: Command) -> Result<Outcome, CommsError> {
		let kind = match command {
			Command::Prepare { .. } => CommandKind::Prepare,
			Command::Blockchain(_) => CommandKind::Blockchain,
			Command::Workload { .. } => CommandKind::Workload,
			Command::Run => CommandKind::Run,
			Command::Results => CommandKind::Results,
			Command::Fin => CommandKind::Fin,
			Command::Unknown(op) => return Ok(Outcome::Err(no_matching_command(op))),
		};

		if let Err(e) = self.state.ensure_allowed(kind) {
			if let Command::Workload { length } = command {
				return self.refuse_body(length, e.to_string()).await;
			}
			return Ok(Outcome::Err(e.to_string()));
		}

		let outcome = match command {
			Command::Prepare {
				secondary_id,
				threads,
			} => match self.engine.prepare(secondary_id, threads).await {
				Ok(()) => {
					self.state.complete(kind);
					Outcome::Ok
				}
				Err(e) => Outcome::Err(format!("prepare failed: {}", e)),
			},
			Command::Blockchain(selector) => self.check_chain(selector),
			Command::Workload { length } => self.load_workload(length).await?,
			Command::Run => {
				let previous = self.state.state();
				self.state.begin_run();
				match self.engine.run().await {
					Ok(()) => {
						self.state.complete(kind);
						Outcome::Ok
					}
					Err(e) => {
						self.state.restore(previous);
						Outcome::Err(format!("run failed: {}", e))
					}
				}
			}
			Command::Results => match self.engine.results().await {
				Ok(results) => match serde_json::to_vec(&results) {
					Ok(payload) => Outcome::Data(payload),
					Err(e) => Outcome::Err(format!("failed to encode results: {}", e)),
				},
				Err(e) => Outcome::Err(format!("results unavailable: {}", e)),
			},
			Command::Fin => {
				self.engine.shutdown().await;
				self.state.complete(kind);
				Outcome::Ok
			}
			Command::Unknown(op) => Outcome::Err(no_matching_command(op)),
		};
		Ok(outcome)
	}

	fn check_chain(&self, selector: u8) -> Outcome {
		let configured = self.engine.config().secondary.chain;
		match ChainKind::from_byte(selector) {
			None => Outcome::Err(format!("unknown blockchain {:#04x}", selector)),
			Some(kind) if kind != configured => Outcome::Err(format!(
				"blockchain {} requested but this secondary drives {}",
				kind, configured
			)),
			Some(_) => Outcome::Ok,
		}
	}

	/// Reads the WORKLOAD body and loads it.
	///
	/// An oversized body is skipped in full. A body that stalls past the read
	/// timeout is refused without a state change.
	async fn load_workload(&mut self, length: u64) -> Result<Outcome, CommsError> {
		let bench = &self.engine.config().benchmark;
		let limit = bench.max_workload_bytes;
		let timeout = bench.workload_read_timeout();

		let size = match usize::try_from(length) {
			Ok(size) if length <= limit => size,
			_ => {
				let reason = format!(
					"workload of {} bytes exceeds limit of {} bytes",
					length, limit
				);
				return self.refuse_body(length, reason).await;
			}
		};

		let body = match self.connection.read_payload(size, timeout).await {
			Ok(body) => body,
			Err(CommsError::Timeout(after)) => {
				return Ok(Outcome::Err(format!(
					"workload body incomplete after {:?}",
					after
				)));
			}
			Err(e) => return Err(e),
		};

		Ok(match self.engine.load_workload(&body) {
			Ok(_) => {
				self.state.complete(CommandKind::Workload);
				Outcome::Ok
			}
			Err(e) => Outcome::Err(format!("invalid workload: {}", e)),
		})
	}

	/// Skips a WORKLOAD body that will not be loaded and refuses the command.
	///
	/// The skip is bounded by the workload read timeout.
	async fn refuse_body(&mut self, length: u64, reason: String) -> Result<Outcome, CommsError> {
		let timeout = self.engine.config().benchmark.workload_read_timeout();
		match self.connection.discard(length, timeout).await {
			Ok(()) => Ok(Outcome::Err(reason)),
			Err(CommsError::Timeout(after)) => Ok(Outcome::Err(format!(
				"{}; body incomplete after {:?}",
				reason, after
			))),
			Err(e) => Err(e),
		}
	}
}

fn no_matching_command(op: u8) -> String {
	format!("no matching command for opcode {:#04x}", op)
}

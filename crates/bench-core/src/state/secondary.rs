//! Secondary state machine.
//!
//! A secondary moves through Idle -> Prepared -> WorkloadLoaded -> Running ->
//! Reporting -> Finished as the primary drives it. Commands received in the
//! wrong state are refused without changing state.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecondaryState {
	Idle,
	Prepared,
	WorkloadLoaded,
	Running,
	Reporting,
	Finished,
}

/// Control commands, without their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
	Prepare,
	Blockchain,
	Workload,
	Run,
	Results,
	Fin,
}

impl fmt::Display for CommandKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			CommandKind::Prepare => "PREPARE",
			CommandKind::Blockchain => "BLOCKCHAIN",
			CommandKind::Workload => "WORKLOAD",
			CommandKind::Run => "RUN",
			CommandKind::Results => "RESULTS",
			CommandKind::Fin => "FIN",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Error)]
pub enum StateError {
	#[error("{command} not allowed in state {state:?}")]
	NotAllowed {
		command: CommandKind,
		state: SecondaryState,
	},
}

/// Tracks the protocol state of one secondary.
#[derive(Debug)]
pub struct SecondaryStateMachine {
	state: SecondaryState,
}

impl Default for SecondaryStateMachine {
	fn default() -> Self {
		Self::new()
	}
}

impl SecondaryStateMachine {
	pub fn new() -> Self {
		Self {
			state: SecondaryState::Idle,
		}
	}

	pub fn state(&self) -> SecondaryState {
		self.state
	}

	/// Fails unless `command` may be handled in the current state.
	pub fn ensure_allowed(&self, command: CommandKind) -> Result<(), StateError> {
		if Self::is_allowed(self.state, command) {
			Ok(())
		} else {
			Err(StateError::NotAllowed {
				command,
				state: self.state,
			})
		}
	}

	/// Moves to the state `command` leads to after it succeeded.
	pub fn complete(&mut self, command: CommandKind) {
		self.state = match command {
			CommandKind::Prepare => SecondaryState::Prepared,
			CommandKind::Blockchain => self.state,
			CommandKind::Workload => SecondaryState::WorkloadLoaded,
			CommandKind::Run | CommandKind::Results => SecondaryState::Reporting,
			CommandKind::Fin => SecondaryState::Finished,
		};
	}

	/// Marks the run as started.
	pub fn begin_run(&mut self) {
		self.state = SecondaryState::Running;
	}

	/// Returns to `state` after a command failed part way.
	pub fn restore(&mut self, state: SecondaryState) {
		self.state = state;
	}

	fn is_allowed(state: SecondaryState, command: CommandKind) -> bool {
		use SecondaryState::*;

		// Static table - each command maps to the states that accept it
		static ALLOWED: Lazy<HashMap<CommandKind, HashSet<SecondaryState>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(CommandKind::Prepare, HashSet::from([Idle]));
			m.insert(
				CommandKind::Blockchain,
				HashSet::from([Idle, Prepared, WorkloadLoaded, Running, Reporting]),
			);
			m.insert(
				CommandKind::Workload,
				HashSet::from([Prepared, WorkloadLoaded]),
			);
			m.insert(CommandKind::Run, HashSet::from([WorkloadLoaded]));
			m.insert(CommandKind::Results, HashSet::from([Reporting]));
			m.insert(
				CommandKind::Fin,
				HashSet::from([Idle, Prepared, WorkloadLoaded, Running, Reporting, Finished]),
			);
			m
		});

		ALLOWED
			.get(&command)
			.is_some_and(|states| states.contains(&state))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_happy_path() {
		let mut machine = SecondaryStateMachine::new();
		for command in [
			CommandKind::Prepare,
			CommandKind::Blockchain,
			CommandKind::Workload,
		] {
			machine.ensure_allowed(command).unwrap();
			machine.complete(command);
		}
		assert_eq!(machine.state(), SecondaryState::WorkloadLoaded);

		machine.ensure_allowed(CommandKind::Run).unwrap();
		machine.begin_run();
		assert_eq!(machine.state(), SecondaryState::Running);
		machine.complete(CommandKind::Run);

		machine.ensure_allowed(CommandKind::Results).unwrap();
		machine.complete(CommandKind::Results);
		assert_eq!(machine.state(), SecondaryState::Reporting);

		machine.ensure_allowed(CommandKind::Fin).unwrap();
		machine.complete(CommandKind::Fin);
		assert_eq!(machine.state(), SecondaryState::Finished);
	}

	#[test]
	fn test_run_before_workload_is_refused() {
		let mut machine = SecondaryStateMachine::new();
		machine.complete(CommandKind::Prepare);
		let err = machine.ensure_allowed(CommandKind::Run).unwrap_err();
		assert_eq!(err.to_string(), "RUN not allowed in state Prepared");
		assert_eq!(machine.state(), SecondaryState::Prepared);
	}

	#[test]
	fn test_workload_can_be_replaced() {
		let mut machine = SecondaryStateMachine::new();
		machine.complete(CommandKind::Prepare);
		machine.complete(CommandKind::Workload);
		assert!(machine.ensure_allowed(CommandKind::Workload).is_ok());
	}

	#[test]
	fn test_prepare_only_once() {
		let mut machine = SecondaryStateMachine::new();
		machine.complete(CommandKind::Prepare);
		assert!(machine.ensure_allowed(CommandKind::Prepare).is_err());
	}

	#[test]
	fn test_blockchain_refused_after_fin() {
		let mut machine = SecondaryStateMachine::new();
		machine.complete(CommandKind::Fin);
		assert!(machine.ensure_allowed(CommandKind::Blockchain).is_err());
		assert!(machine.ensure_allowed(CommandKind::Fin).is_ok());
	}
}

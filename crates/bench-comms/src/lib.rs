//! Control protocol between the benchmark primary and its secondaries.
//!
//! The primary drives each secondary over one TCP connection with single-byte
//! commands, some followed by a fixed big-endian header. The secondary answers
//! every command with OK, with ERR carrying a message, or with DATA followed by
//! OK.
//!
//! | opcode | command    | header |
//! |--------|------------|--------|
//! | `0x01` | PREPARE    | u32 secondary id, u32 thread count |
//! | `0x02` | BLOCKCHAIN | u8 chain selector |
//! | `0x03` | WORKLOAD   | u64 body length, then the body |
//! | `0x04` | RUN        | |
//! | `0x05` | RESULTS    | |
//! | `0x06` | FIN        | |
//!
//! [`ControlConnection`] is the secondary end, [`ControlClient`] the primary end.

use thiserror::Error;

mod client;
mod connection;

pub use client::{ControlClient, Reply};
pub use connection::ControlConnection;

/// Wire opcodes.
pub mod opcode {
	pub const PREPARE: u8 = 0x01;
	pub const BLOCKCHAIN: u8 = 0x02;
	pub const WORKLOAD: u8 = 0x03;
	pub const RUN: u8 = 0x04;
	pub const RESULTS: u8 = 0x05;
	pub const FIN: u8 = 0x06;

	pub const OK: u8 = 0x10;
	pub const ERR: u8 = 0x11;
	pub const DATA: u8 = 0x12;
}

/// Errors that can occur on the control connection.
#[derive(Debug, Error)]
pub enum CommsError {
	/// The underlying stream failed or ended early.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// A body did not arrive in full before the deadline.
	#[error("Read timed out after {0:?}")]
	Timeout(std::time::Duration),
	/// The peer sent a reply opcode this side does not understand.
	#[error("Unexpected reply opcode {0:#04x}")]
	UnexpectedReply(u8),
}

/// A command as decoded from its opcode and fixed header.
///
/// The WORKLOAD body is not part of the command; the caller reads it with
/// [`ControlConnection::read_payload`] or skips it with
/// [`ControlConnection::discard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Prepare { secondary_id: u32, threads: u32 },
	Blockchain(u8),
	Workload { length: u64 },
	Run,
	Results,
	Fin,
	/// An opcode with no matching command.
	Unknown(u8),
}

impl Command {
	/// Display name used in logs and error replies.
	pub fn name(&self) -> &'static str {
		match self {
			Command::Prepare { .. } => "PREPARE",
			Command::Blockchain(_) => "BLOCKCHAIN",
			Command::Workload { .. } => "WORKLOAD",
			Command::Run => "RUN",
			Command::Results => "RESULTS",
			Command::Fin => "FIN",
			Command::Unknown(_) => "UNKNOWN",
		}
	}

	/// Appends the opcode and fixed header of this command to `buf`.
	pub fn encode(&self, buf: &mut bytes::BytesMut) {
		use bytes::BufMut;

		match *self {
			Command::Prepare {
				secondary_id,
				threads,
			} => {
				buf.put_u8(opcode::PREPARE);
				buf.put_u32(secondary_id);
				buf.put_u32(threads);
			}
			Command::Blockchain(kind) => {
				buf.put_u8(opcode::BLOCKCHAIN);
				buf.put_u8(kind);
			}
			Command::Workload { length } => {
				buf.put_u8(opcode::WORKLOAD);
				buf.put_u64(length);
			}
			Command::Run => buf.put_u8(opcode::RUN),
			Command::Results => buf.put_u8(opcode::RESULTS),
			Command::Fin => buf.put_u8(opcode::FIN),
			Command::Unknown(op) => buf.put_u8(op),
		}
	}
}

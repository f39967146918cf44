//! Primary end of the control connection.
//!
//! Used by the benchmark primary and by tests that play its part.

use crate::{opcode, Command, CommsError};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reply sent by a secondary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
	Ok,
	Err(String),
	Data(Vec<u8>),
}

impl Reply {
	pub fn is_ok(&self) -> bool {
		matches!(self, Reply::Ok)
	}
}

/// Sends commands to a secondary and decodes its replies.
pub struct ControlClient<S> {
	stream: S,
}

impl<S> ControlClient<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S) -> Self {
		Self { stream }
	}

	/// Sends a command without a body and waits for its reply.
	pub async fn request(&mut self, command: Command) -> Result<Reply, CommsError> {
		let mut buf = BytesMut::new();
		command.encode(&mut buf);
		self.send_raw(&buf).await?;
		self.read_reply().await
	}

	pub async fn prepare(&mut self, secondary_id: u32, threads: u32) -> Result<Reply, CommsError> {
		self.request(Command::Prepare {
			secondary_id,
			threads,
		})
		.await
	}

	pub async fn blockchain(&mut self, selector: u8) -> Result<Reply, CommsError> {
		self.request(Command::Blockchain(selector)).await
	}

	/// Sends WORKLOAD with its length-prefixed body.
	pub async fn workload(&mut self, body: &[u8]) -> Result<Reply, CommsError> {
		let mut buf = BytesMut::with_capacity(9 + body.len());
		Command::Workload {
			length: body.len() as u64,
		}
		.encode(&mut buf);
		buf.extend_from_slice(body);
		self.send_raw(&buf).await?;
		self.read_reply().await
	}

	pub async fn run(&mut self) -> Result<Reply, CommsError> {
		self.request(Command::Run).await
	}

	pub async fn results(&mut self) -> Result<Reply, CommsError> {
		self.request(Command::Results).await
	}

	pub async fn fin(&mut self) -> Result<Reply, CommsError> {
		self.request(Command::Fin).await
	}

	/// Writes raw bytes to the connection.
	pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), CommsError> {
		self.stream.write_all(bytes).await?;
		self.stream.flush().await?;
		Ok(())
	}

	/// Reads one reply. DATA consumes the OK that follows it.
	pub async fn read_reply(&mut self) -> Result<Reply, CommsError> {
		match self.stream.read_u8().await? {
			opcode::OK => Ok(Reply::Ok),
			opcode::ERR => {
				let len = self.stream.read_u32().await? as usize;
				let mut message = vec![0u8; len];
				self.stream.read_exact(&mut message).await?;
				Ok(Reply::Err(String::from_utf8_lossy(&message).into_owned()))
			}
			opcode::DATA => {
				let len = self.stream.read_u64().await? as usize;
				let mut payload = vec![0u8; len];
				self.stream.read_exact(&mut payload).await?;
				match self.stream.read_u8().await? {
					opcode::OK => Ok(Reply::Data(payload)),
					other => Err(CommsError::UnexpectedReply(other)),
				}
			}
			other => Err(CommsError::UnexpectedReply(other)),
		}
	}
}

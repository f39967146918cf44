//! Secondary end of the control connection.

use crate::{opcode, Command, CommsError};
use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads commands from the primary and writes replies back.
pub struct ControlConnection<S> {
	stream: S,
}

impl<S> ControlConnection<S>
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	pub fn new(stream: S) -> Self {
		Self { stream }
	}

	/// Reads the next opcode and its fixed header.
	///
	/// Waits as long as needed for the opcode. An error here means the stream
	/// is no longer usable.
	pub async fn read_command(&mut self) -> Result<Command, CommsError> {
		let op = self.stream.read_u8().await?;
		tracing::trace!(opcode = op, "Read opcode");
		let command = match op {
			opcode::PREPARE => {
				let secondary_id = self.stream.read_u32().await?;
				let threads = self.stream.read_u32().await?;
				Command::Prepare {
					secondary_id,
					threads,
				}
			}
			opcode::BLOCKCHAIN => Command::Blockchain(self.stream.read_u8().await?),
			opcode::WORKLOAD => Command::Workload {
				length: self.stream.read_u64().await?,
			},
			opcode::RUN => Command::Run,
			opcode::RESULTS => Command::Results,
			opcode::FIN => Command::Fin,
			other => Command::Unknown(other),
		};
		Ok(command)
	}

	/// Reads a body of exactly `length` bytes, giving up after `timeout`.
	pub async fn read_payload(
		&mut self,
		length: usize,
		timeout: Duration,
	) -> Result<Vec<u8>, CommsError> {
		let mut body = vec![0u8; length];
		tokio::time::timeout(timeout, self.stream.read_exact(&mut body))
			.await
			.map_err(|_| CommsError::Timeout(timeout))??;
		Ok(body)
	}

	/// Skips `length` body bytes so the next opcode is read in sync, giving up
	/// after `timeout`.
	pub async fn discard(&mut self, length: u64, timeout: Duration) -> Result<(), CommsError> {
		let mut body = (&mut self.stream).take(length);
		let mut sink = tokio::io::sink();
		let skipped = tokio::time::timeout(timeout, tokio::io::copy(&mut body, &mut sink))
			.await
			.map_err(|_| CommsError::Timeout(timeout))??;
		if skipped < length {
			return Err(CommsError::Io(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				format!("stream ended after {} of {} bytes", skipped, length),
			)));
		}
		tracing::debug!(bytes = length, "Discarded command body");
		Ok(())
	}

	pub async fn reply_ok(&mut self) -> Result<(), CommsError> {
		self.write_frame(&[opcode::OK]).await
	}

	/// Sends ERR with a UTF-8 message.
	pub async fn reply_err(&mut self, message: &str) -> Result<(), CommsError> {
		let mut buf = BytesMut::with_capacity(5 + message.len());
		buf.put_u8(opcode::ERR);
		buf.put_u32(message.len() as u32);
		buf.put_slice(message.as_bytes());
		self.write_frame(&buf).await
	}

	/// Sends DATA with `payload`, then OK.
	pub async fn reply_data(&mut self, payload: &[u8]) -> Result<(), CommsError> {
		let mut buf = BytesMut::with_capacity(10 + payload.len());
		buf.put_u8(opcode::DATA);
		buf.put_u64(payload.len() as u64);
		buf.put_slice(payload);
		buf.put_u8(opcode::OK);
		self.write_frame(&buf).await
	}

	async fn write_frame(&mut self, frame: &[u8]) -> Result<(), CommsError> {
		self.stream.write_all(frame).await?;
		self.stream.flush().await?;
		Ok(())
	}
}

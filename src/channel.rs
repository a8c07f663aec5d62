//! The line-oriented byte channel to the device.

use crate::{
	backend::{Backend, Connect, UNKNOWN_BACKEND_NAME},
	command::CommandFrame,
	error::ChannelError,
};
use std::{
	io,
	time::{Duration, Instant},
};

/// The number of bytes requested from the backend per read.
const READ_CHUNK_SIZE: usize = 256;

/// Owns the connection to the device at a fixed path and baud rate.
///
/// A channel only performs I/O. It never decides what a fault means for the
/// connection; callers do that.
#[derive(Debug)]
pub struct Channel<B> {
	/// The path of the port.
	path: String,
	/// The baud rate the port is opened with.
	baud_rate: u32,
	/// The open backend, if any.
	backend: Option<B>,
	/// Received bytes that do not form a complete line yet.
	partial: Vec<u8>,
}

impl<B: Backend> Channel<B> {
	/// Create a closed channel for the device at `path`.
	pub fn new<S: Into<String>>(path: S, baud_rate: u32) -> Self {
		Channel {
			path: path.into(),
			baud_rate,
			backend: None,
			partial: Vec::new(),
		}
	}

	/// The path of the port.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// The baud rate the port is opened with.
	pub fn baud_rate(&self) -> u32 {
		self.baud_rate
	}

	/// Whether the channel is currently open.
	pub fn is_open(&self) -> bool {
		self.backend.is_some()
	}

	/// The name used to identify the channel in logs.
	pub fn name(&self) -> String {
		self.backend
			.as_ref()
			.and_then(Backend::name)
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string())
	}

	/// Open the channel with `connector`. Any previously open backend is
	/// closed first.
	pub fn open<C>(&mut self, connector: &C) -> Result<(), ChannelError>
	where
		C: Connect<Backend = B> + ?Sized,
	{
		self.close();
		let backend = connector.connect(&self.path, self.baud_rate)?;
		self.backend = Some(backend);
		Ok(())
	}

	/// Close the channel. Closing a closed channel does nothing.
	pub fn close(&mut self) {
		self.partial.clear();
		if let Some(mut backend) = self.backend.take() {
			let name = backend
				.name()
				.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string());
			// Flush whatever is still pending so the device sees complete
			// lines. The port is going away either way.
			if let Err(e) = backend.flush() {
				log::warn!("{name} failed to flush while closing: {e}");
			}
		}
	}

	/// Get the open backend or report that the channel is closed.
	fn backend_mut(&mut self) -> Result<&mut B, ChannelError> {
		self.backend
			.as_mut()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed").into())
	}

	/// Write raw bytes and flush them to the device.
	pub fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
		let backend = self.backend_mut()?;
		backend.write_all(bytes)?;
		backend.flush()?;
		Ok(())
	}

	/// Write a command frame and flush it to the device.
	pub fn write_frame(&mut self, frame: &CommandFrame) -> Result<(), ChannelError> {
		let mut buffer = Vec::with_capacity(8);
		frame.write_into(&mut buffer)?;
		self.write(&buffer)
	}

	/// Discard any received data that has not been read yet, including a
	/// partially received line.
	pub fn clear_input(&mut self) -> Result<(), ChannelError> {
		self.partial.clear();
		self.backend_mut()?.clear_input()?;
		Ok(())
	}

	/// Return the complete lines received since the last call.
	///
	/// If no complete line is buffered, waits for data until `deadline` but no
	/// longer. Lines are returned without surrounding whitespace and empty
	/// lines are skipped.
	pub fn read_available_lines(&mut self, deadline: Instant) -> Result<Vec<String>, ChannelError> {
		let lines = self.drain_lines();
		if !lines.is_empty() {
			return Ok(lines);
		}

		let wait = deadline.saturating_duration_since(Instant::now());
		let backend = self.backend_mut()?;
		backend.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
		let mut chunk = [0u8; READ_CHUNK_SIZE];
		match backend.read(&mut chunk) {
			Ok(0) => {
				return Err(io::Error::new(
					io::ErrorKind::UnexpectedEof,
					"device closed the connection",
				)
				.into())
			}
			Ok(n) => self.partial.extend_from_slice(&chunk[..n]),
			Err(e)
				if matches!(
					e.kind(),
					io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
				) => {}
			Err(e) => return Err(e.into()),
		}
		Ok(self.drain_lines())
	}

	/// Split the complete lines off the front of the partial buffer.
	fn drain_lines(&mut self) -> Vec<String> {
		let mut lines = Vec::new();
		while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
			let raw: Vec<u8> = self.partial.drain(..=end).collect();
			let line = String::from_utf8_lossy(&raw);
			let line = line.trim();
			if !line.is_empty() {
				lines.push(line.to_string());
			}
		}
		lines
	}
}

//! Exchanging commands and responses with the device.

use crate::{
	backend::Backend,
	channel::Channel,
	command::{Command, CommandFrame},
	connection::{ConnectionState, StateCell},
	error::ChannelError,
	response::{CommandResult, Termination, READY},
};
use std::{
	fmt,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::{Duration, Instant},
};

/// Sends one command at a time to the device and collects its response.
///
/// The channel is guarded so that the write of a command and the reads of
/// its response are never interleaved with those of another command, no
/// matter how many threads call [`send`](Protocol::send). Callers queue in
/// the order the guard grants it; no further fairness is promised.
pub struct Protocol<B> {
	/// The channel, once a connection has been attempted.
	channel: Mutex<Option<Channel<B>>>,
	/// The connection state shared with the connection manager.
	state: Arc<StateCell>,
	/// How long to wait for the device to finish a command.
	response_timeout: Duration,
}

impl<B> fmt::Debug for Protocol<B> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Protocol")
			.field("state", &self.state.get())
			.field("response_timeout", &self.response_timeout)
			.finish_non_exhaustive()
	}
}

impl<B: Backend> Protocol<B> {
	pub(crate) fn new(state: Arc<StateCell>, response_timeout: Duration) -> Self {
		Protocol {
			channel: Mutex::new(None),
			state,
			response_timeout,
		}
	}

	/// Acquire exclusive use of the channel.
	pub(crate) fn lock_channel(&self) -> MutexGuard<'_, Option<Channel<B>>> {
		self.channel.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// The current connection state.
	pub fn state(&self) -> ConnectionState {
		self.state.get()
	}

	/// How long the device is given to finish a command.
	pub fn response_timeout(&self) -> Duration {
		self.response_timeout
	}

	/// Send `frame` to the device and collect its response.
	///
	/// If the device is not connected the result ends in
	/// [`ChannelError`](Termination::ChannelError) without touching the
	/// channel. A fault while writing or reading also ends the exchange with
	/// `ChannelError` and leaves the connection
	/// [`Faulted`](ConnectionState::Faulted).
	pub fn send(&self, frame: CommandFrame) -> CommandResult {
		let command = frame.command();
		let state = self.state();
		if !state.is_connected() {
			log::warn!("cannot send {command}: device is {state}");
			return CommandResult::channel_error(command);
		}

		let mut guard = self.lock_channel();
		// The connection may have changed while waiting for the channel.
		let state = self.state();
		match guard.as_mut() {
			Some(channel) if state.is_connected() => self.exchange(channel, frame),
			_ => {
				log::warn!("cannot send {command}: device is {state}");
				CommandResult::channel_error(command)
			}
		}
	}

	/// Write `frame` to `channel` and read lines until the exchange ends.
	///
	/// Unread input is discarded first. The caller must hold the channel
	/// guard.
	pub(crate) fn exchange(&self, channel: &mut Channel<B>, frame: CommandFrame) -> CommandResult {
		let command = frame.command();
		let name = channel.name();

		// Anything still unread belongs to an earlier exchange.
		if let Err(e) = channel.clear_input() {
			return self.fault(&name, command, Vec::new(), e);
		}
		log::debug!("{name} TX:   {command}");
		if let Err(e) = channel.write_frame(&frame) {
			return self.fault(&name, command, Vec::new(), e);
		}

		let deadline = Instant::now() + self.response_timeout;
		let mut lines = Vec::new();
		loop {
			let received = match channel.read_available_lines(deadline) {
				Ok(received) => received,
				Err(e) => return self.fault(&name, command, lines, e),
			};

			let mut received = received.into_iter();
			while let Some(line) = received.next() {
				log::debug!("{name} RECV: {line}");
				let done = frame.wait_for_ready() && line == READY;
				lines.push(line);
				if done {
					for extra in received {
						log::warn!("{name} discarding line received after {READY}: {extra}");
					}
					return CommandResult::new(command, lines, Termination::ReadySentinelSeen);
				}
			}

			if Instant::now() >= deadline {
				if frame.wait_for_ready() {
					log::warn!("{name} timed out waiting for the device to finish {command}");
				}
				return CommandResult::new(command, lines, Termination::TimedOut);
			}
		}
	}

	/// Record a channel fault and produce the result for the aborted exchange.
	fn fault(
		&self,
		name: &str,
		command: Command,
		lines: Vec<String>,
		error: ChannelError,
	) -> CommandResult {
		log::error!("{name} channel fault during {command}: {error}");
		self.state.set(ConnectionState::Faulted);
		CommandResult::new(command, lines, Termination::ChannelError)
	}
}

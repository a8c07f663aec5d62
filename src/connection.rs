//! Establishing, tracking, and tearing down the connection to the device.

use crate::{
	backend::Connect,
	channel::Channel,
	command::{Command, CommandFrame},
	error::{ConnectFailedError, Error},
	options::LinkOptions,
	protocol::Protocol,
};
use std::{
	fmt,
	sync::{Arc, PoisonError, RwLock},
	thread,
};

/// The state of the connection to the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	/// No connection has been made, or it was closed.
	Disconnected,
	/// A connection attempt is in progress.
	Connecting,
	/// The device answered the status probe and no channel fault has
	/// occurred since.
	Connected,
	/// Connecting failed, or a channel fault occurred during a command.
	Faulted,
}

impl ConnectionState {
	/// Whether commands may be sent to the device.
	pub fn is_connected(self) -> bool {
		self == ConnectionState::Connected
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConnectionState::Disconnected => "disconnected",
			ConnectionState::Connecting => "connecting",
			ConnectionState::Connected => "connected",
			ConnectionState::Faulted => "faulted",
		})
	}
}

/// The shared, current [`ConnectionState`].
///
/// Reads never wait for a command to finish.
#[derive(Debug)]
pub(crate) struct StateCell(RwLock<ConnectionState>);

impl StateCell {
	pub(crate) fn new(state: ConnectionState) -> Self {
		StateCell(RwLock::new(state))
	}

	pub(crate) fn get(&self) -> ConnectionState {
		*self.0.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Transition to `state`, returning the previous state.
	pub(crate) fn set(&self, state: ConnectionState) -> ConnectionState {
		let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
		let previous = std::mem::replace(&mut *guard, state);
		if previous != state {
			log::debug!("connection {previous} -> {state}");
		}
		previous
	}
}

/// Connects to the device and owns the resulting [`Protocol`].
///
/// Connecting opens the port, waits for the device to boot, and probes it
/// with `STATUS`, retrying the whole sequence a fixed number of times. A
/// channel fault during a later command leaves the connection
/// [`Faulted`](ConnectionState::Faulted); it is not re-established until
/// [`connect`](ConnectionManager::connect) is called again.
pub struct ConnectionManager<C: Connect> {
	/// Opens the backend for every attempt.
	connector: C,
	/// Timing and probe configuration.
	options: LinkOptions,
	/// The current connection state.
	state: Arc<StateCell>,
	/// The protocol running over the channel.
	protocol: Protocol<C::Backend>,
}

impl<C: Connect> fmt::Debug for ConnectionManager<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("state", &self.state())
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl<C: Connect> ConnectionManager<C> {
	/// Create a disconnected manager that opens channels with `connector`.
	pub fn new(connector: C, options: LinkOptions) -> Self {
		let state = Arc::new(StateCell::new(ConnectionState::Disconnected));
		let protocol = Protocol::new(Arc::clone(&state), options.get_response_timeout());
		ConnectionManager {
			connector,
			options,
			state,
			protocol,
		}
	}

	/// Connect to the device at `path`.
	///
	/// Any existing connection is closed first. Each attempt opens the port,
	/// waits for the [grace period](LinkOptions::grace_period), discards
	/// whatever the device printed while booting, and sends a `STATUS` probe.
	/// The attempt succeeds if the device finishes the probe with an
	/// affirmative line and no error. Failed attempts are followed by the
	/// [retry pause](LinkOptions::retry_pause), except for the last one.
	///
	/// On success the connection is [`Connected`](ConnectionState::Connected).
	/// Otherwise it is [`Faulted`](ConnectionState::Faulted) and a
	/// [`ConnectFailedError`] is returned.
	pub fn connect(&self, path: &str, baud_rate: u32) -> Result<(), ConnectFailedError> {
		let attempts = self.options.get_max_attempts();
		let mut guard = self.protocol.lock_channel();
		if let Some(old) = guard.as_mut() {
			old.close();
		}
		let channel = guard.insert(Channel::new(path, baud_rate));

		for attempt in 1..=attempts {
			self.state.set(ConnectionState::Connecting);
			match self.attempt(channel) {
				Ok(()) => {
					self.state.set(ConnectionState::Connected);
					log::info!("device connected on {path} (attempt {attempt} of {attempts})");
					return Ok(());
				}
				Err(e) => {
					log::warn!("connection attempt {attempt} of {attempts} on {path} failed: {e}");
					channel.close();
				}
			}
			if attempt < attempts {
				thread::sleep(self.options.get_retry_pause());
			}
		}

		self.state.set(ConnectionState::Faulted);
		log::error!("failed to connect to device on {path} after {attempts} attempt(s)");
		Err(ConnectFailedError::new(path, attempts))
	}

	/// Make a single open, wait, and probe attempt.
	fn attempt(&self, channel: &mut Channel<C::Backend>) -> Result<(), Error> {
		channel.open(&self.connector)?;
		thread::sleep(self.options.get_grace_period());
		channel.clear_input()?;
		let result = self
			.protocol
			.exchange(channel, CommandFrame::new(Command::Status));
		result.check_affirmed(self.options.get_affirmative_marker(), self.state.get())?;
		Ok(())
	}

	/// Close the connection.
	///
	/// Waits for a command in progress to finish. Never fails and may be
	/// called any number of times; faults while closing are logged.
	pub fn disconnect(&self) {
		let mut guard = self.protocol.lock_channel();
		if let Some(channel) = guard.as_mut() {
			if channel.is_open() {
				log::info!("disconnecting from device on {}", channel.path());
			}
			channel.close();
		}
		self.state.set(ConnectionState::Disconnected);
	}

	/// The current connection state.
	pub fn state(&self) -> ConnectionState {
		self.state.get()
	}

	/// Whether the device is connected.
	pub fn is_connected(&self) -> bool {
		self.state().is_connected()
	}

	/// The protocol used to exchange commands with the device.
	pub fn protocol(&self) -> &Protocol<C::Backend> {
		&self.protocol
	}

	/// The options the manager was created with.
	pub fn options(&self) -> &LinkOptions {
		&self.options
	}

	/// The connector used to open the channel.
	pub fn connector(&self) -> &C {
		&self.connector
	}
}

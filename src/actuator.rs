//! The high level interface to the sorting actuator.
//!
//! An [`Actuator`] is shared between request handlers (typically behind an
//! [`Arc`]) and validates, sends, and interprets every command on their
//! behalf, keeping the [`Statistics`] up to date as it goes.
//!
//! ```rust,no_run
//! # use sortlink::{Actuator, LinkOptions};
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let actuator = Actuator::serial(LinkOptions::new());
//! actuator.connect("/dev/ttyACM0", LinkOptions::DEFAULT_BAUD_RATE)?;
//! actuator.move_to("left")?;
//! println!("{:?}", actuator.status());
//! # Ok(())
//! # }
//! ```

#[cfg(test)]
mod test;

use crate::{
	backend::{Connect, SerialConnector},
	command::{Command, CommandFrame, Direction},
	connection::{ConnectionManager, ConnectionState},
	error::{ActuationError, ConnectFailedError},
	options::LinkOptions,
	response::CommandResult,
	stats::{Counter, Snapshot, Statistics},
};
use std::{fmt, sync::Arc};

/// The connection state and statistics at one point in time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Status {
	/// The state of the connection to the device.
	pub state: ConnectionState,
	/// The statistics.
	pub stats: Snapshot,
}

/// Moves the sorting servo and runs device diagnostics.
///
/// All methods take `&self` and may be called from any number of threads.
/// Commands are sent to the device one at a time.
pub struct Actuator<C: Connect = SerialConnector> {
	connection: ConnectionManager<C>,
	stats: Arc<Statistics>,
}

impl<C: Connect> fmt::Debug for Actuator<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Actuator")
			.field("connection", &self.connection)
			.field("stats", &self.stats)
			.finish()
	}
}

impl Actuator<SerialConnector> {
	/// Create a disconnected actuator that talks to the device over a serial
	/// port, with fresh statistics.
	pub fn serial(options: LinkOptions) -> Self {
		Actuator::new(SerialConnector, options, Arc::new(Statistics::new()))
	}
}

impl<C: Connect> Actuator<C> {
	/// Create a disconnected actuator that opens the device with `connector`
	/// and records its activity in `stats`.
	pub fn new(connector: C, options: LinkOptions, stats: Arc<Statistics>) -> Self {
		Actuator {
			connection: ConnectionManager::new(connector, options),
			stats,
		}
	}

	/// Connect to the device at `path`.
	///
	/// See [`ConnectionManager::connect`].
	pub fn connect(&self, path: &str, baud_rate: u32) -> Result<(), ConnectFailedError> {
		self.connection.connect(path, baud_rate)
	}

	/// Disconnect from the device. Never fails.
	pub fn disconnect(&self) {
		self.connection.disconnect();
	}

	/// The current connection state.
	pub fn state(&self) -> ConnectionState {
		self.connection.state()
	}

	/// Whether the device is connected.
	pub fn is_connected(&self) -> bool {
		self.connection.is_connected()
	}

	/// The underlying connection manager.
	pub fn connection(&self) -> &ConnectionManager<C> {
		&self.connection
	}

	/// The statistics this actuator records into.
	pub fn stats(&self) -> &Arc<Statistics> {
		&self.stats
	}

	/// The connection state and a snapshot of the statistics.
	pub fn status(&self) -> Status {
		Status {
			state: self.state(),
			stats: self.stats.snapshot(),
		}
	}

	/// Move the servo in the direction named by `direction`.
	///
	/// The name is matched case-insensitively against `LEFT`, `RIGHT`, and
	/// `CENTER`. Any other name is rejected with
	/// [`InvalidCommand`](ActuationError::InvalidCommand) before anything is
	/// sent, and is not counted.
	pub fn move_to(&self, direction: &str) -> Result<CommandResult, ActuationError> {
		let direction: Direction = direction.parse().map_err(|e| {
			log::error!("rejected move: {e}");
			e
		})?;
		self.move_direction(direction)
	}

	/// Move the servo to `direction`.
	///
	/// A successful move to the left or right is counted in
	/// [`LeftMoves`](Counter::LeftMoves) or [`RightMoves`](Counter::RightMoves).
	/// Any failure is counted in [`Errors`](Counter::Errors).
	pub fn move_direction(&self, direction: Direction) -> Result<CommandResult, ActuationError> {
		let outcome = self.run(Command::Move(direction));
		match &outcome {
			Ok(_) => {
				log::info!("servo moved {direction}");
				match direction {
					Direction::Left => self.stats.record(Counter::LeftMoves),
					Direction::Right => self.stats.record(Counter::RightMoves),
					Direction::Center => {}
				}
			}
			Err(e) => {
				log::error!("failed to move servo {direction}: {e}");
				self.stats.record(Counter::Errors);
			}
		}
		outcome
	}

	/// Run the device's self test sequence. A failure is counted in
	/// [`Errors`](Counter::Errors).
	pub fn self_test(&self) -> Result<CommandResult, ActuationError> {
		let outcome = self.run(Command::Test);
		match &outcome {
			Ok(_) => log::info!("self test passed"),
			Err(e) => {
				log::error!("self test failed: {e}");
				self.stats.record(Counter::Errors);
			}
		}
		outcome
	}

	/// Ask the device for its status.
	///
	/// Succeeds only if the device finishes the probe without error and some
	/// line contains the configured
	/// [affirmative marker](LinkOptions::affirmative_marker). Nothing is
	/// counted.
	pub fn probe(&self) -> Result<CommandResult, ActuationError> {
		let result = self
			.connection
			.protocol()
			.send(CommandFrame::new(Command::Status));
		result.check_affirmed(
			self.connection.options().get_affirmative_marker(),
			self.state(),
		)
	}

	/// Send `command` and check that the device completed it.
	fn run(&self, command: Command) -> Result<CommandResult, ActuationError> {
		self.connection
			.protocol()
			.send(CommandFrame::new(command))
			.check(self.state())
	}
}

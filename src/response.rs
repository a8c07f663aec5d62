//! Types for inspecting the device's response to a command.
//!
//! The device answers each command with zero or more text lines. When it has
//! finished processing the command it prints the [ready sentinel](READY). Any
//! line containing [`ERROR_MARKER`] marks the whole exchange as failed, even if
//! the sentinel was also received.

use crate::{
	command::Command,
	connection::ConnectionState,
	error::{
		ActuationError, CommandTimeoutError, DeviceError, NotConnectedError, ProbeNotAffirmedError,
	},
};
use std::fmt;

/// The line the device prints once it has finished processing a command.
pub const READY: &str = "READY";

/// The substring that marks a response line as an error report.
pub const ERROR_MARKER: &str = "ERROR";

/// How the exchange for a command came to an end.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Termination {
	/// The device printed the ready sentinel.
	ReadySentinelSeen,
	/// The response window elapsed before the exchange finished.
	TimedOut,
	/// The channel was unusable or failed during the exchange.
	ChannelError,
}

impl fmt::Display for Termination {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Termination::ReadySentinelSeen => "ready",
			Termination::TimedOut => "timed out",
			Termination::ChannelError => "channel error",
		})
	}
}

/// The lines received in response to a command and how the exchange ended.
///
/// Lines are kept in the order they were received and do not include line
/// terminators. The ready sentinel, if received, is the last line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandResult {
	/// The command that produced this result.
	command: Command,
	/// The received lines.
	lines: Vec<String>,
	/// How the exchange ended.
	termination: Termination,
}

impl CommandResult {
	/// Create a result for the exchange of `command`.
	pub fn new(command: Command, lines: Vec<String>, termination: Termination) -> Self {
		CommandResult {
			command,
			lines,
			termination,
		}
	}

	/// The result of a command that could not be exchanged at all.
	pub(crate) fn channel_error(command: Command) -> Self {
		CommandResult::new(command, Vec::new(), Termination::ChannelError)
	}

	/// The command that produced this result.
	pub fn command(&self) -> Command {
		self.command
	}

	/// The received lines, in order.
	pub fn lines(&self) -> &[String] {
		&self.lines
	}

	/// How the exchange ended.
	pub fn termination(&self) -> Termination {
		self.termination
	}

	/// Whether the device finished the command by printing the ready sentinel.
	pub fn is_ready(&self) -> bool {
		self.termination == Termination::ReadySentinelSeen
	}

	/// Whether any line reports an error, regardless of how the exchange ended.
	pub fn is_erroneous(&self) -> bool {
		self.error_lines().next().is_some()
	}

	/// The lines that report an error.
	pub fn error_lines(&self) -> impl Iterator<Item = &str> {
		self.lines
			.iter()
			.map(String::as_str)
			.filter(|line| line.contains(ERROR_MARKER))
	}

	/// Whether the exchange completed without timing out, failing on the
	/// channel, or any line reporting an error.
	pub fn is_success(&self) -> bool {
		!matches!(
			self.termination,
			Termination::ChannelError | Termination::TimedOut
		) && !self.is_erroneous()
	}

	/// Whether the device completed the command successfully and any line
	/// contains `marker`.
	pub fn is_affirmed_by(&self, marker: &str) -> bool {
		self.is_ready() && !self.is_erroneous() && self.lines.iter().any(|line| line.contains(marker))
	}

	/// All lines joined with line feeds.
	pub fn text(&self) -> String {
		self.lines.join("\n")
	}

	/// Consume the result and return the received lines.
	pub fn into_lines(self) -> Vec<String> {
		self.lines
	}

	/// Return the result if the device completed the command without error.
	///
	/// A channel error is reported as the connection being in `state`. Error
	/// lines take precedence over a timeout.
	pub(crate) fn check(self, state: ConnectionState) -> Result<Self, ActuationError> {
		match self.termination() {
			Termination::ChannelError => Err(NotConnectedError::new(state).into()),
			_ if self.is_erroneous() => Err(DeviceError::new(self).into()),
			Termination::TimedOut => Err(CommandTimeoutError::new(self).into()),
			Termination::ReadySentinelSeen => Ok(self),
		}
	}

	/// Like [`check`](CommandResult::check), but also require a line
	/// containing `marker`.
	pub(crate) fn check_affirmed(
		self,
		marker: &str,
		state: ConnectionState,
	) -> Result<Self, ActuationError> {
		let result = self.check(state)?;
		if result.is_affirmed_by(marker) {
			Ok(result)
		} else {
			Err(ProbeNotAffirmedError::new(result).into())
		}
	}
}

impl fmt::Display for CommandResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} ({}, {} line(s))",
			self.command,
			self.termination,
			self.lines.len()
		)
	}
}

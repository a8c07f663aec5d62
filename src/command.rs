//! Types for generating commands for the actuator.
//!
//! The device understands exactly one command per line: a directional move
//! (`LEFT`, `RIGHT`, `CENTER`), a self test (`TEST`), or a status probe
//! (`STATUS`).

use crate::error::InvalidCommandError;
use std::{fmt, io, str::FromStr};

/// A position the sorting servo can be moved to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
	/// Sort the item to the left.
	Left,
	/// Sort the item to the right.
	Right,
	/// Return to the neutral position.
	Center,
}

impl Direction {
	/// All directions, in wire order.
	pub const ALL: [Direction; 3] = [Direction::Left, Direction::Right, Direction::Center];

	/// The wire token for the direction.
	pub const fn token(self) -> &'static str {
		match self {
			Direction::Left => "LEFT",
			Direction::Right => "RIGHT",
			Direction::Center => "CENTER",
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.token())
	}
}

impl FromStr for Direction {
	type Err = InvalidCommandError;

	/// Parse a direction, ignoring case and surrounding whitespace.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let token = s.trim();
		Direction::ALL
			.into_iter()
			.find(|direction| direction.token().eq_ignore_ascii_case(token))
			.ok_or_else(|| InvalidCommandError::new(s))
	}
}

/// A command in the device's vocabulary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
	/// Move the servo.
	Move(Direction),
	/// Run the device's self test sequence.
	Test,
	/// Ask the device to report its status.
	Status,
}

impl Command {
	/// The wire token for the command.
	pub const fn token(self) -> &'static str {
		match self {
			Command::Move(direction) => direction.token(),
			Command::Test => "TEST",
			Command::Status => "STATUS",
		}
	}
}

impl From<Direction> for Command {
	fn from(direction: Direction) -> Self {
		Command::Move(direction)
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.token())
	}
}

impl FromStr for Command {
	type Err = InvalidCommandError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let token = s.trim();
		if token.eq_ignore_ascii_case(Command::Test.token()) {
			Ok(Command::Test)
		} else if token.eq_ignore_ascii_case(Command::Status.token()) {
			Ok(Command::Status)
		} else {
			s.parse().map(Command::Move)
		}
	}
}

/// A single command to transmit, along with how its response should be read.
///
/// A frame is created per request and consumed when it is sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandFrame {
	/// The command to send.
	command: Command,
	/// Whether the response ends at the ready sentinel.
	wait_for_ready: bool,
}

impl CommandFrame {
	/// Create a frame for `command` whose response ends at the ready sentinel.
	pub const fn new(command: Command) -> Self {
		CommandFrame {
			command,
			wait_for_ready: true,
		}
	}

	/// Create a frame for `command` whose response is read until the
	/// response timeout elapses.
	pub const fn until_timeout(command: Command) -> Self {
		CommandFrame {
			command,
			wait_for_ready: false,
		}
	}

	/// The command carried by the frame.
	pub const fn command(&self) -> Command {
		self.command
	}

	/// Whether reading stops once the ready sentinel is received.
	pub const fn wait_for_ready(&self) -> bool {
		self.wait_for_ready
	}

	/// Write the frame as it appears on the wire: the token followed by a
	/// line feed.
	pub fn write_into<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
		writeln!(writer, "{}", self.command.token())
	}
}

impl From<Command> for CommandFrame {
	fn from(command: Command) -> Self {
		CommandFrame::new(command)
	}
}

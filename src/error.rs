//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! However, most APIs return more than one kind of error and so will return one
//! of the higher level [enums](#enums), such as [`ChannelError`],
//! [`ActuationError`], [`SortError`], or [`Error`]. Where appropriate, the error
//! types are convertible to the higher level enums, allowing them to be used
//! with `?`:
//!
//! ```
//! use sortlink::error::{ActuationError, Error};
//!
//! fn foo() -> Result<(), ActuationError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), Error> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! }
//! ```
//!
//! Errors that were produced by an exchange with the device keep the
//! [`CommandResult`] of that exchange. Use [`AsRef`] and [`From`]/[`Into`] to
//! retrieve it.

use crate::{connection::ConnectionState, response::CommandResult, sorting::Analysis};

/// Implement Error and Display traits for the specified type.
///
/// After the type define the format string and any arguments it should
/// reference after `self =>` (to abide by macro hygiene rules).
macro_rules! impl_error_display {
	(
		$name:path,
		$self:ident =>
		$display:literal
		$(,
			$($arg:expr),+
		)?
	) => {
		impl std::error::Error for $name {}

		impl std::fmt::Display for $name {
			fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(
					f,
					$display
					$(,
						$($arg),+
					)?
				)
			}
		}
	};
}

macro_rules! impl_is_timeout {
	($name:ident) => {
		impl $name {
			/// A convenience function for determining if the error is due to the
			/// channel timing out.
			pub fn is_timeout(&self) -> bool {
				matches!(self, $name::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
			}
		}
	};
}

macro_rules! impl_from_serialport_error {
	($name:ident) => {
		impl From<serialport::Error> for $name {
			fn from(other: serialport::Error) -> Self {
				use std::io;

				match other.kind() {
					serialport::ErrorKind::NoDevice => $name::SerialDeviceInUseOrDisconnected(
						SerialDeviceInUseOrDisconnectedError(other.description.into_boxed_str()),
					),
					serialport::ErrorKind::InvalidInput => $name::Io(io::Error::new(
						io::ErrorKind::InvalidInput,
						other.description,
					)),
					serialport::ErrorKind::Unknown => {
						$name::Io(io::Error::new(io::ErrorKind::Other, other.description))
					}
					serialport::ErrorKind::Io(kind) => {
						$name::Io(io::Error::new(kind, other.description))
					}
				}
			}
		}
	};
}

/// Implement `new()`, `result()`, `AsRef<CommandResult>` and
/// `From<Error> for CommandResult` for errors wrapping the result of an exchange.
macro_rules! impl_for_type_containing_result {
	($name:ident) => {
		impl $name {
			/// Create a instance of the error
			pub(crate) fn new(result: CommandResult) -> Self {
				$name(result)
			}

			/// Get the result of the exchange with the device.
			pub fn result(&self) -> &CommandResult {
				&self.0
			}
		}

		impl AsRef<CommandResult> for $name {
			/// Get access to the result associated with this error.
			fn as_ref(&self) -> &CommandResult {
				&self.0
			}
		}

		impl From<$name> for CommandResult {
			/// Consume the error and return the result associated with it.
			fn from(other: $name) -> Self {
				other.0
			}
		}
	};
}

/// Define error enums that contain concrete error types (not other error enums).
///
/// From and TryFrom traits will be implemented for the enum and it's underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
///
/// Simple implementations of From and TryFrom with other error enums can be
/// added by appending a succinct impl block, which assumes that:
///   * it is being implemented for this error enum,
///   * each variant has a single tuple value, and can be converted to the value
///     in this enum with its own From implementation.
///
/// ```compile_fail
/// # // This fails to compile because the macro is not exported.
/// error_enum!{
///     // This defines the enum and From/TryFrom between ThisError and A and B.
///     #[non_exhaustive]
///     pub enum ThisError {
///         VariantA(A),
///         VariantB(B),
///         // ...
///     }
///
///     // This implements a simple From/TryFrom between ThisError and OtherType.
///     impl From<OtherType> {
///         FromVariantA => VariantA,
///         // ...
///     }
/// }
/// ```
macro_rules! error_enum {
	(
		$(#[$attr:meta])*
		pub enum $name:ident {
			$(
				$variant:ident($inner:path)
			),+
			$(,)?
		}
		$(
			impl From<$from_t:ident>
			{
				$($from_variant:ident => $to_variant:ident),+
				$(,)?
			}
		)*
	) => {
		$(
			#[$attr]
		)*
		#[allow(missing_docs)]
		pub enum $name {
			$(
				$variant($inner)
			),+
		}

		impl std::error::Error for $name {}

		// Defer the display to the inner error type
		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				match self {
					$(
						$name::$variant(e) => e.fmt(f)
					),+
				}
			}
		}

		$(
			impl From<$inner> for $name {
				fn from(other: $inner) -> Self {
					$name::$variant(other)
				}
			}

			impl TryFrom<$name> for $inner {
				type Error = $name;
				fn try_from(other: $name) -> Result<Self, Self::Error> {
					match other {
						$name::$variant(value) => Ok(value),
						#[allow(unreachable_patterns)]
						value => Err(value)
					}
				}
			}
		)+

		$(
			impl From<$from_t> for $name {
				fn from(other: $from_t) -> Self {
					match other {
						$($from_t::$from_variant(e) => $name::$to_variant(From::from(e))),+
					}
				}
			}

			impl TryFrom<$name> for $from_t {
				type Error = $name;
				fn try_from(other: $name) -> Result<Self, Self::Error> {
					match other {
						$(
							$name::$to_variant(e) => Ok($from_t::$from_variant(From::from(e)))
						),+
						,
						#[allow(unreachable_patterns)]
						_ => Err(other)
					}
				}
			}
		)*
	};
}

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
	SerialDeviceInUseOrDisconnectedError,
	self =>
	"the specified device is either disconnected or already in use by another process: {}", self.0
}

/// A command token is not part of the device's vocabulary.
///
/// It is rejected before anything is written to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidCommandError(Box<str>);

impl InvalidCommandError {
	/// Create a instance of the error
	pub(crate) fn new(token: &str) -> Self {
		InvalidCommandError(token.into())
	}

	/// Get the rejected token.
	pub fn token(&self) -> &str {
		&self.0
	}
}

impl_error_display! {
	InvalidCommandError,
	self => "invalid command {:?}, expected one of LEFT, RIGHT, CENTER, TEST, or STATUS", self.0
}

/// The channel to the device is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotConnectedError(ConnectionState);

impl NotConnectedError {
	/// Create a instance of the error
	pub(crate) fn new(state: ConnectionState) -> Self {
		NotConnectedError(state)
	}

	/// The connection state observed when the request failed.
	pub fn state(&self) -> ConnectionState {
		self.0
	}
}

impl_error_display! {
	NotConnectedError,
	self => "device is not connected (connection is {})", self.0
}

/// The device did not finish the command within the response window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTimeoutError(CommandResult);

impl_error_display! {
	CommandTimeoutError,
	self => "timed out waiting for {} to finish after receiving {} line(s)", self.0.command(), self.0.lines().len()
}
impl_for_type_containing_result! { CommandTimeoutError }

/// The device reported an error while executing the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError(CommandResult);

impl_error_display! {
	DeviceError,
	self => "device failed to execute {}: {}", self.0.command(), self.0.error_lines().collect::<Vec<_>>().join("; ")
}
impl_for_type_containing_result! { DeviceError }

/// The device answered a status probe without reporting that it is healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeNotAffirmedError(CommandResult);

impl_error_display! {
	ProbeNotAffirmedError,
	self => "device did not affirm the status probe: {:?}", self.0.text()
}
impl_for_type_containing_result! { ProbeNotAffirmedError }

/// Every attempt to connect to the device failed.
///
/// The connection is left [`Faulted`](ConnectionState::Faulted).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectFailedError {
	/// The path of the port.
	path: Box<str>,
	/// The number of attempts that were made.
	attempts: u32,
}

impl ConnectFailedError {
	/// Create a instance of the error
	pub(crate) fn new(path: &str, attempts: u32) -> Self {
		ConnectFailedError {
			path: path.into(),
			attempts,
		}
	}

	/// The path of the port that could not be connected.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// The number of connection attempts made before giving up.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}
}

impl_error_display! {
	ConnectFailedError,
	self => "failed to connect to device on {} after {} attempt(s)", self.path, self.attempts
}

/// The external analysis service could not classify an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassificationError(Box<str>);

impl ClassificationError {
	/// Create an error with the given description.
	pub fn new<S: AsRef<str>>(message: S) -> Self {
		ClassificationError(message.as_ref().into())
	}

	/// Get the description of the failure.
	pub fn message(&self) -> &str {
		&self.0
	}
}

impl_error_display! {
	ClassificationError,
	self => "classification failed: {}", self.0
}

/// An item was classified but the device failed to sort it.
#[derive(Debug)]
pub struct PartialFailureError(Box<(Analysis, ActuationError)>);

impl PartialFailureError {
	/// Create a instance of the error
	pub(crate) fn new(analysis: Analysis, cause: ActuationError) -> Self {
		PartialFailureError(Box::new((analysis, cause)))
	}

	/// The classification that was produced for the item.
	pub fn analysis(&self) -> &Analysis {
		&self.0 .0
	}

	/// Why the actuation failed.
	pub fn cause(&self) -> &ActuationError {
		&self.0 .1
	}

	/// Consume the error and return the analysis and the actuation error.
	pub fn into_parts(self) -> (Analysis, ActuationError) {
		*self.0
	}
}

impl_error_display! {
	PartialFailureError,
	self => "classified {:?} as {} but failed to sort it: {}", self.0 .0.item_name(), self.0 .0.direction(), self.0 .1
}

error_enum! {
	/// A channel-level fault.
	///
	/// These are caught at the protocol boundary and never reach callers of
	/// the actuation API directly.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum ChannelError {
		SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
		Io(std::io::Error),
	}
}
impl_is_timeout! { ChannelError }
impl_from_serialport_error! { ChannelError }

error_enum! {
	/// Why a request to the actuator failed.
	#[derive(Debug, Clone, PartialEq, Eq)]
	#[non_exhaustive]
	pub enum ActuationError {
		InvalidCommand(InvalidCommandError),
		NotConnected(NotConnectedError),
		CommandTimeout(CommandTimeoutError),
		Device(DeviceError),
		ProbeNotAffirmed(ProbeNotAffirmedError),
	}
}

impl ActuationError {
	/// Whether the device did not finish the command in time.
	pub fn is_timeout(&self) -> bool {
		matches!(self, ActuationError::CommandTimeout(_))
	}

	/// Whether the request failed because the device could not be reached at
	/// all, as opposed to the device rejecting or failing the command.
	pub fn is_unreachable(&self) -> bool {
		matches!(self, ActuationError::NotConnected(_))
	}

	/// The result of the exchange with the device, if one took place.
	pub fn result(&self) -> Option<&CommandResult> {
		match self {
			ActuationError::CommandTimeout(e) => Some(e.result()),
			ActuationError::Device(e) => Some(e.result()),
			ActuationError::ProbeNotAffirmed(e) => Some(e.result()),
			ActuationError::InvalidCommand(_) | ActuationError::NotConnected(_) => None,
		}
	}
}

error_enum! {
	/// Why a sort cycle failed.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum SortError {
		NotConnected(NotConnectedError),
		Classification(ClassificationError),
		PartialFailure(PartialFailureError),
	}
}

impl SortError {
	/// Whether the cycle was refused because the device is unreachable. No
	/// classification was attempted in that case.
	pub fn is_unreachable(&self) -> bool {
		matches!(self, SortError::NotConnected(_))
	}
}

error_enum! {
	/// Any error returned by this library.
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum Error {
		SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
		Io(std::io::Error),
		InvalidCommand(InvalidCommandError),
		NotConnected(NotConnectedError),
		CommandTimeout(CommandTimeoutError),
		Device(DeviceError),
		ProbeNotAffirmed(ProbeNotAffirmedError),
		ConnectFailed(ConnectFailedError),
		Classification(ClassificationError),
		PartialFailure(PartialFailureError),
	}

	impl From<ChannelError> {
		SerialDeviceInUseOrDisconnected => SerialDeviceInUseOrDisconnected,
		Io => Io,
	}

	impl From<ActuationError> {
		InvalidCommand => InvalidCommand,
		NotConnected => NotConnected,
		CommandTimeout => CommandTimeout,
		Device => Device,
		ProbeNotAffirmed => ProbeNotAffirmed,
	}

	impl From<SortError> {
		NotConnected => NotConnected,
		Classification => Classification,
		PartialFailure => PartialFailure,
	}
}
impl_is_timeout! { Error }
impl_from_serialport_error! { Error }

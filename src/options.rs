//! Options for how the link to the device is established and used.

use std::time::Duration;

/// Options for connecting to and exchanging commands with the device.
///
/// ## Example
///
/// ```rust
/// # use sortlink::LinkOptions;
/// # use std::time::Duration;
/// let mut options = LinkOptions::new();
/// options
///     .grace_period(Duration::from_secs(2))
///     .response_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
	/// How long the device needs to boot after the port is opened.
	grace_period: Duration,
	/// How many times to try connecting before giving up.
	max_attempts: u32,
	/// The pause between connection attempts.
	retry_pause: Duration,
	/// How long to wait for the device to finish a command.
	response_timeout: Duration,
	/// The substring a status probe must contain to be considered healthy.
	affirmative_marker: String,
}

impl LinkOptions {
	/// The default baud rate of the device's firmware: 115,200.
	pub const DEFAULT_BAUD_RATE: u32 = 115_200;

	/// Create a default set of options ready for configuration.
	///
	/// The defaults are a 3 second grace period, 5 connection attempts
	/// separated by 2 second pauses, an 8 second response timeout, and
	/// `System Ready: YES` as the affirmative marker.
	///
	/// Equivalent to [`default`](LinkOptions::default).
	pub fn new() -> Self {
		LinkOptions {
			grace_period: Duration::from_secs(3),
			max_attempts: 5,
			retry_pause: Duration::from_secs(2),
			response_timeout: Duration::from_secs(8),
			affirmative_marker: "System Ready: YES".to_string(),
		}
	}

	/// Set how long to wait after opening the port before probing the device.
	///
	/// The device's firmware restarts when the port is opened and ignores
	/// commands until it has booted. The default is 3 seconds.
	pub fn grace_period(&mut self, duration: Duration) -> &mut Self {
		self.grace_period = duration;
		self
	}

	/// Set the number of connection attempts made before giving up.
	///
	/// Values less than one are treated as one. The default is 5.
	pub fn max_attempts(&mut self, attempts: u32) -> &mut Self {
		self.max_attempts = attempts.max(1);
		self
	}

	/// Set the pause between failed connection attempts.
	///
	/// The default is 2 seconds.
	pub fn retry_pause(&mut self, duration: Duration) -> &mut Self {
		self.retry_pause = duration;
		self
	}

	/// Set how long to wait for the device to finish a command.
	///
	/// The default is 8 seconds.
	pub fn response_timeout(&mut self, duration: Duration) -> &mut Self {
		self.response_timeout = duration;
		self
	}

	/// Set the substring the response to a status probe must contain.
	///
	/// The default is `System Ready: YES`, the line the firmware's status
	/// report contains once its servos are initialised.
	pub fn affirmative_marker<S: Into<String>>(&mut self, marker: S) -> &mut Self {
		self.affirmative_marker = marker.into();
		self
	}

	/// The configured grace period.
	pub fn get_grace_period(&self) -> Duration {
		self.grace_period
	}

	/// The configured number of connection attempts.
	pub fn get_max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// The configured pause between connection attempts.
	pub fn get_retry_pause(&self) -> Duration {
		self.retry_pause
	}

	/// The configured response timeout.
	pub fn get_response_timeout(&self) -> Duration {
		self.response_timeout
	}

	/// The configured affirmative marker.
	pub fn get_affirmative_marker(&self) -> &str {
		&self.affirmative_marker
	}
}

impl Default for LinkOptions {
	fn default() -> Self {
		LinkOptions::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults() {
		let options = LinkOptions::default();
		assert_eq!(options.get_grace_period(), Duration::from_secs(3));
		assert_eq!(options.get_max_attempts(), 5);
		assert_eq!(options.get_retry_pause(), Duration::from_secs(2));
		assert_eq!(options.get_response_timeout(), Duration::from_secs(8));
		assert_eq!(options.get_affirmative_marker(), "System Ready: YES");
	}

	#[test]
	fn at_least_one_attempt() {
		let mut options = LinkOptions::new();
		options.max_attempts(0);
		assert_eq!(options.get_max_attempts(), 1);
	}
}

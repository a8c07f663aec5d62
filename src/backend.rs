//! Types that can exchange (read/write) bytes with a connected device.
//!
//! The [`Backend`] trait represents all such types and the [`Connect`] trait
//! represents the types that open them.

use crate::error::ChannelError;
use std::io;
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

#[cfg(any(test, feature = "mock"))]
pub use mock::{Mock, MockConnector};

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write + private::Sealed {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Discard any received data that has not been read yet.
	fn clear_input(&mut self) -> Result<(), io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		(**self).clear_input()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Wrapping whichever one the
// platform provides lets the rest of the crate name a single concrete type
// without dynamic dispatch or an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// The serialport API does not support infinite timeouts, so simply set
		// the timeout to the largest possible duration if `timeout` is `None`,
		// which is practically infinite.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn clear_input(&mut self) -> Result<(), io::Error> {
		Ok(self.0.clear(sp::ClearBuffer::Input)?)
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

/// Types that open a [`Backend`] to the device at a given path.
pub trait Connect {
	/// The type of backend that is opened.
	type Backend: Backend;

	/// Open the device at `path` with the specified baud rate.
	fn connect(&self, path: &str, baud_rate: u32) -> Result<Self::Backend, ChannelError>;
}

/// Opens [`Serial`] ports configured the way the actuator's firmware expects
/// them: eight data bits, no parity, one stop bit, and no flow control.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SerialConnector;

impl SerialConnector {
	/// The read timeout the port is opened with. The channel adjusts it for
	/// every read.
	const INITIAL_TIMEOUT: Duration = Duration::from_millis(100);
}

impl Connect for SerialConnector {
	type Backend = Serial;

	fn connect(&self, path: &str, baud_rate: u32) -> Result<Serial, ChannelError> {
		// Due to https://gitlab.com/susurrus/serialport-rs/-/issues/102, the
		// baud rate passed to new is ignored. It must be defined using the
		// baud_rate method below.
		sp::new(path, baud_rate)
			.data_bits(sp::DataBits::Eight)
			.parity(sp::Parity::None)
			.flow_control(sp::FlowControl::None)
			.stop_bits(sp::StopBits::One)
			.timeout(SerialConnector::INITIAL_TIMEOUT)
			.baud_rate(baud_rate)
			.open_native()
			.map(Serial)
			.map_err(Into::into)
	}
}

#[cfg(any(test, feature = "mock"))]
mod mock {
	use super::{Backend, Connect};
	use crate::error::ChannelError;
	use std::{
		collections::VecDeque,
		io,
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc, Mutex, MutexGuard, PoisonError,
		},
		thread,
		time::{Duration, Instant},
	};

	/// The firmware's answer to `STATUS` on a freshly booted, healthy board.
	const STATUS_REPORT: &[&str] = &[
		"=== ARDUINO SYSTEM STATUS ===",
		"System Ready: YES",
		"Uptime: 4 seconds",
		"Total Movements: 0",
		"Left Movements: 0",
		"Right Movements: 0",
		"Servo 1 Position: 90",
		"Servo 2 Position: 90",
		"Free Memory: 1432 bytes",
		"============================",
	];

	/// Produces the response lines for a command line written to a [`Mock`].
	type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

	/// A mock backend for use in testing.
	///
	/// It has the following features:
	///   * It records every command line written to it.
	///   * It can be filled with data for reading, either directly or by a
	///     responder that answers each written command, optionally after a
	///     delay.
	///   * Specific errors can be inserted for calls to `read`, `write`,
	///     `flush`, and `set_read_timeout`.
	///   * It counts commands that were written while the response to a
	///     previous command was still unread.
	///
	/// A `Mock` is a handle: clones share the same simulated device, so a test
	/// can keep one to inspect the device after handing another to a
	/// [`MockConnector`].
	#[derive(Clone)]
	pub struct Mock {
		inner: Arc<Mutex<Inner>>,
	}

	struct Inner {
		/// Data ready to be read.
		buffer: VecDeque<u8>,
		/// Data that becomes readable at the given instant.
		scheduled: VecDeque<(Instant, Vec<u8>)>,
		/// Bytes written since the last line feed.
		partial_command: Vec<u8>,
		/// Every complete command line written, without the line feed.
		commands: Vec<String>,
		/// Commands written while the previous response was still unread.
		overlapping_writes: usize,
		/// Answers written commands.
		responder: Option<Responder>,
		/// How long the responder's output takes to arrive.
		response_delay: Duration,
		/// The error to surface on the next read, if any. It is only surfaced once.
		read_error: Option<io::Error>,
		/// The error to surface on the next write, if any. It is only surfaced once.
		write_error: Option<io::Error>,
		/// The error to surface on the next flush, if any. It is only surfaced once.
		flush_error: Option<io::Error>,
		/// The error to surface on the next set_read_timeout, if any. It is only surfaced once.
		set_read_timeout_error: Option<io::Error>,
		/// The read timeout, honoured when no data is available.
		read_timeout: Option<Duration>,
	}

	impl Inner {
		/// Move scheduled data that has arrived into the read buffer.
		fn deliver(&mut self, now: Instant) {
			while let Some((at, _)) = self.scheduled.front() {
				if *at > now {
					break;
				}
				if let Some((_, bytes)) = self.scheduled.pop_front() {
					self.buffer.extend(bytes);
				}
			}
		}

		fn is_idle(&self) -> bool {
			self.buffer.is_empty() && self.scheduled.is_empty()
		}
	}

	impl Mock {
		/// The longest a read waits when the read timeout is infinite.
		const MAX_IDLE_WAIT: Duration = Duration::from_millis(10);

		/// Create a new Mock backend that never answers on its own.
		pub fn new() -> Self {
			Mock {
				inner: Arc::new(Mutex::new(Inner {
					buffer: VecDeque::new(),
					scheduled: VecDeque::new(),
					partial_command: Vec::new(),
					commands: Vec::new(),
					overlapping_writes: 0,
					responder: None,
					response_delay: Duration::ZERO,
					read_error: None,
					write_error: None,
					flush_error: None,
					set_read_timeout_error: None,
					read_timeout: Some(Duration::ZERO),
				})),
			}
		}

		/// Create a Mock that answers each command with the lines produced by
		/// `responder`. Each line is terminated with `\r\n`.
		pub fn with_responder<F>(responder: F) -> Self
		where
			F: FnMut(&str) -> Vec<String> + Send + 'static,
		{
			let mock = Mock::new();
			mock.lock().responder = Some(Box::new(responder));
			mock
		}

		/// Create a Mock that answers like the actuator's firmware: moves and
		/// the self test succeed, `STATUS` prints the firmware's status report
		/// with `System Ready: YES`, and unknown commands are rejected with an
		/// `ERROR` line. Every answer ends with `READY`.
		pub fn firmware() -> Self {
			Mock::with_responder(|command| {
				let mut lines = vec![format!("Received command: {command}")];
				match command {
					"LEFT" | "RIGHT" | "CENTER" => {
						lines.push(format!("Executing sorting movement: {command}"));
						lines.push(format!("{command} movement completed"));
					}
					"TEST" => {
						lines.push("Starting complete system test...".to_string());
						lines.push("Complete system test finished".to_string());
					}
					"STATUS" => lines.extend(STATUS_REPORT.iter().map(ToString::to_string)),
					other => {
						lines.push(format!("ERROR: Unknown command - {other}"));
						lines.push("Valid commands: LEFT, RIGHT, CENTER, TEST, STATUS".to_string());
					}
				}
				lines.push("READY".to_string());
				lines
			})
		}

		fn lock(&self) -> MutexGuard<'_, Inner> {
			self.inner.lock().unwrap_or_else(PoisonError::into_inner)
		}

		/// Append data to the read buffer.
		///
		/// The data is not validated in any way.
		pub fn append_data<T: AsRef<[u8]>>(&self, bytes: T) {
			self.lock().buffer.extend(bytes.as_ref());
		}

		/// Append a `\r\n` terminated line for each of `lines` to the read buffer.
		pub fn append_lines<I, S>(&self, lines: I)
		where
			I: IntoIterator<Item = S>,
			S: AsRef<str>,
		{
			let mut inner = self.lock();
			for line in lines {
				inner.buffer.extend(line.as_ref().as_bytes());
				inner.buffer.extend(b"\r\n");
			}
		}

		/// Clear the read buffer, including any scheduled responses.
		pub fn clear_buffer(&self) {
			let mut inner = self.lock();
			inner.buffer.clear();
			inner.scheduled.clear();
		}

		/// Whether the mock has any data available or scheduled.
		pub fn is_empty(&self) -> bool {
			self.lock().is_idle()
		}

		/// Delay the responder's output by `delay`.
		pub fn set_response_delay(&self, delay: Duration) {
			self.lock().response_delay = delay;
		}

		/// The command lines written so far, without line terminators.
		pub fn commands(&self) -> Vec<String> {
			self.lock().commands.clone()
		}

		/// The number of commands written while the response to a previous
		/// command had not been completely read.
		pub fn overlapping_writes(&self) -> usize {
			self.lock().overlapping_writes
		}

		/// Set the error for the next `read`, if any.
		pub fn read_error(&self, err: Option<io::Error>) {
			self.lock().read_error = err;
		}
		/// Set the error for the next `write`, if any.
		pub fn write_error(&self, err: Option<io::Error>) {
			self.lock().write_error = err;
		}
		/// Set the error for the next `flush`, if any.
		pub fn flush_error(&self, err: Option<io::Error>) {
			self.lock().flush_error = err;
		}
		/// Set the error for the next `set_read_timeout`, if any.
		pub fn set_read_timeout_error(&self, err: Option<io::Error>) {
			self.lock().set_read_timeout_error = err;
		}
	}

	impl Default for Mock {
		fn default() -> Self {
			Self::new()
		}
	}

	impl std::fmt::Debug for Mock {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			let inner = self.lock();
			f.debug_struct("Mock")
				.field("commands", &inner.commands)
				.field("buffered", &inner.buffer.len())
				.field("scheduled", &inner.scheduled.len())
				.finish_non_exhaustive()
		}
	}

	impl Backend for Mock {
		fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
			let mut inner = self.lock();
			if let Some(err) = inner.set_read_timeout_error.take() {
				Err(err)
			} else {
				inner.read_timeout = timeout;
				Ok(())
			}
		}

		fn clear_input(&mut self) -> Result<(), io::Error> {
			self.lock().buffer.clear();
			Ok(())
		}

		fn name(&self) -> Option<String> {
			Some(format!("<mock 0x{:x}>", Arc::as_ptr(&self.inner) as usize))
		}
	}

	impl io::Read for Mock {
		fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
			let wait = {
				let mut inner = self.lock();
				if let Some(err) = inner.read_error.take() {
					return Err(err);
				}
				let now = Instant::now();
				inner.deliver(now);
				if !inner.buffer.is_empty() {
					let n = buf.len().min(inner.buffer.len());
					for (slot, byte) in buf.iter_mut().zip(inner.buffer.drain(..n)) {
						*slot = byte;
					}
					return Ok(n);
				}
				let timeout = inner.read_timeout.unwrap_or(Mock::MAX_IDLE_WAIT);
				match inner.scheduled.front() {
					Some((at, _)) => timeout.min(at.saturating_duration_since(now)),
					None => timeout,
				}
			};

			// Behave like a real port: block until data arrives or the read
			// times out, without holding the lock.
			thread::sleep(wait);
			let mut inner = self.lock();
			inner.deliver(Instant::now());
			if inner.buffer.is_empty() {
				Err(io::Error::new(
					io::ErrorKind::TimedOut,
					"Simulated timeout error",
				))
			} else {
				let n = buf.len().min(inner.buffer.len());
				for (slot, byte) in buf.iter_mut().zip(inner.buffer.drain(..n)) {
					*slot = byte;
				}
				Ok(n)
			}
		}
	}

	impl io::Write for Mock {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			let mut inner = self.lock();
			if let Some(err) = inner.write_error.take() {
				return Err(err);
			}
			for &byte in buf {
				if byte != b'\n' {
					inner.partial_command.push(byte);
					continue;
				}
				let raw = std::mem::take(&mut inner.partial_command);
				let command = String::from_utf8_lossy(&raw).trim().to_string();
				if !inner.is_idle() {
					inner.overlapping_writes += 1;
				}
				let lines = match inner.responder.as_mut() {
					Some(responder) => (responder)(&command),
					None => Vec::new(),
				};
				inner.commands.push(command);
				if !lines.is_empty() {
					let mut bytes = Vec::new();
					for line in lines {
						bytes.extend_from_slice(line.as_bytes());
						bytes.extend_from_slice(b"\r\n");
					}
					let at = Instant::now() + inner.response_delay;
					inner.scheduled.push_back((at, bytes));
				}
			}
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			if let Some(err) = self.lock().flush_error.take() {
				Err(err)
			} else {
				Ok(())
			}
		}
	}

	/// Opens [`Mock`] backends, counting every attempt.
	///
	/// Each successful connection hands out a handle to the same simulated
	/// device.
	#[derive(Debug)]
	pub struct MockConnector {
		/// The device handed out on success.
		device: Mock,
		/// How many of the upcoming attempts fail.
		failures: AtomicUsize,
		/// Attempts made so far.
		attempts: AtomicUsize,
	}

	impl MockConnector {
		/// Create a connector that always succeeds in opening `device`.
		pub fn new(device: Mock) -> Self {
			MockConnector::failing_first(0, device)
		}

		/// Create a connector whose first `n` attempts fail before `device` can
		/// be opened.
		pub fn failing_first(n: usize, device: Mock) -> Self {
			MockConnector {
				device,
				failures: AtomicUsize::new(n),
				attempts: AtomicUsize::new(0),
			}
		}

		/// Create a connector that never succeeds.
		pub fn unavailable() -> Self {
			MockConnector::failing_first(usize::MAX, Mock::new())
		}

		/// The number of connection attempts made so far.
		pub fn attempts(&self) -> usize {
			self.attempts.load(Ordering::SeqCst)
		}

		/// A handle to the simulated device.
		pub fn device(&self) -> &Mock {
			&self.device
		}
	}

	impl Connect for MockConnector {
		type Backend = Mock;

		fn connect(&self, path: &str, _baud_rate: u32) -> Result<Mock, ChannelError> {
			self.attempts.fetch_add(1, Ordering::SeqCst);
			let failed = self
				.failures
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok();
			if failed {
				Err(io::Error::new(
					io::ErrorKind::NotFound,
					format!("simulated failure to open {path}"),
				)
				.into())
			} else {
				Ok(self.device.clone())
			}
		}
	}
}

mod private {
	pub trait Sealed {}

	impl Sealed for super::Serial {}
	#[cfg(any(test, feature = "mock"))]
	impl Sealed for super::Mock {}
	impl<C: super::Backend + ?Sized> Sealed for Box<C> {}
}

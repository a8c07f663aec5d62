use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	thread,
	time::{Duration, Instant},
};

use crate::{
	actuator::Actuator,
	backend::{Mock, MockConnector, Serial, SerialConnector},
	command::Direction,
	connection::ConnectionState,
	error::*,
	options::LinkOptions,
	response::Termination,
	stats::Statistics,
};

static_assertions::assert_impl_all!(Actuator<SerialConnector>: Send, Sync);
static_assertions::assert_impl_all!(Actuator<MockConnector>: Send, Sync);
static_assertions::assert_impl_all!(Statistics: Send, Sync);
static_assertions::assert_impl_all!(Serial: Send);

fn options() -> LinkOptions {
	let mut options = LinkOptions::new();
	options
		.grace_period(Duration::ZERO)
		.max_attempts(1)
		.retry_pause(Duration::ZERO)
		.response_timeout(Duration::from_millis(100));
	options
}

fn actuator(device: Mock) -> Actuator<MockConnector> {
	Actuator::new(
		MockConnector::new(device),
		options(),
		Arc::new(Statistics::new()),
	)
}

/// A device that affirms the status probe and answers every other command
/// with whatever is currently in `reply`.
fn scripted() -> (Mock, Arc<Mutex<Vec<&'static str>>>) {
	let reply = Arc::new(Mutex::new(vec!["ACK", "READY"]));
	let script = Arc::clone(&reply);
	let device = Mock::with_responder(move |command| {
		let lines = if command == "STATUS" {
			vec!["System Ready: YES", "READY"]
		} else {
			script.lock().unwrap().clone()
		};
		lines.into_iter().map(String::from).collect()
	});
	(device, reply)
}

/// Generate code to check how the actuator interprets the device's replies.
///
/// The syntax is `<actuator>, <reply>, <case>...` where `<reply>` is the
/// shared list of lines the device answers with and `<case>`s are separated
/// by `,`:
///
///   * `ok case [<line>...] via <closure_calling_the_actuator>`
///   * `err case [<line>...] via <closure_calling_the_actuator> => <expected_error_type>`
macro_rules! check_cases {
	($actuator:ident, $reply:ident, ok case [$($line:literal),*] via $method:expr, $($rest:tt)*) => {
		*$reply.lock().unwrap() = vec![$($line),*];
		let m: fn(&Actuator<MockConnector>) -> Result<_, ActuationError> = $method;
		if let Err(e) = (m)(&$actuator) {
			panic!(
				"unexpected error for reply {} via {}:\n\tactual error: {}\n\t{:?}\n",
				stringify!([$($line),*]),
				stringify!($method),
				e,
				e
			);
		}
		check_cases!($actuator, $reply, $($rest)*)
	};

	($actuator:ident, $reply:ident, err case [$($line:literal),*] via $method:expr => $err_type:ident, $($rest:tt)*) => {
		*$reply.lock().unwrap() = vec![$($line),*];
		let m: fn(&Actuator<MockConnector>) -> Result<_, ActuationError> = $method;
		match (m)(&$actuator) {
			Err(e) => {
				if let Err(e) = $err_type::try_from(e) {
					panic!(
						"unexpected error for reply {} via {}:\n\texpected:\t{}\n\tgot:\t\t{}\n\t\t\t{:?}\n",
						stringify!([$($line),*]),
						stringify!($method),
						stringify!($err_type),
						e,
						e
					);
				}
			}
			Ok(result) => panic!(
				"unexpected success for reply {} via {}: {}",
				stringify!([$($line),*]),
				stringify!($method),
				result
			),
		}
		check_cases!($actuator, $reply, $($rest)*)
	};

	($actuator:ident, $reply:ident, $(,)?) => {};
}

#[test]
fn replies_are_interpreted() {
	let (device, reply) = scripted();
	let actuator = actuator(device);
	actuator.connect("mock", 115_200).unwrap();

	check_cases!(actuator, reply,
		ok case ["ACK", "READY"] via |a| a.move_to("LEFT"),
		ok case ["Received command: RIGHT", "RIGHT movement completed", "READY"] via |a| a.move_to("right"),
		ok case ["READY"] via |a| a.move_direction(Direction::Center),
		ok case ["Complete system test finished", "READY"] via |a| a.self_test(),
		ok case ["ACK", "READY"] via |a| a.probe(),
		err case ["ERROR: Servo movement failed", "READY"] via |a| a.move_to("LEFT") => DeviceError,
		err case ["ERROR: Unknown command - LEFT", "READY"] via |a| a.move_to("LEFT") => DeviceError,
		err case ["ACK"] via |a| a.move_to("RIGHT") => CommandTimeoutError,
		err case [] via |a| a.self_test() => CommandTimeoutError,
		err case ["ERROR: test aborted"] via |a| a.self_test() => DeviceError,
		err case ["ACK", "READY"] via |a| a.move_to("UP") => InvalidCommandError,
		err case ["ACK", "READY"] via |a| a.move_to("") => InvalidCommandError,
	);
	// A slow or failing device is not a channel fault.
	assert_eq!(actuator.state(), ConnectionState::Connected);
}

#[test]
fn successful_left_move_is_counted() {
	let (device, _) = scripted();
	let actuator = actuator(device.clone());
	actuator.connect("mock", 115_200).unwrap();

	let result = actuator.move_to("LEFT").unwrap();
	assert_eq!(result.lines(), ["ACK", "READY"]);
	assert_eq!(result.termination(), Termination::ReadySentinelSeen);

	let stats = actuator.status().stats;
	assert_eq!(stats.left_moves, 1);
	assert_eq!(stats.right_moves, 0);
	assert_eq!(stats.errors, 0);
	assert_eq!(device.commands(), ["STATUS", "LEFT"]);
}

#[test]
fn center_moves_are_not_counted_as_sorts() {
	let actuator = actuator(Mock::firmware());
	actuator.connect("mock", 115_200).unwrap();
	actuator.move_to("CENTER").unwrap();
	let stats = actuator.stats().snapshot();
	assert_eq!(stats.left_moves + stats.right_moves + stats.errors, 0);
}

#[test]
fn invalid_direction_is_rejected_without_io() {
	let (device, _) = scripted();
	let actuator = actuator(device.clone());
	actuator.connect("mock", 115_200).unwrap();

	let err = actuator.move_to("UP").unwrap_err();
	match err {
		ActuationError::InvalidCommand(ref e) => assert_eq!(e.token(), "UP"),
		other => panic!("unexpected error: {other:?}"),
	}
	assert_eq!(device.commands(), ["STATUS"]);
	assert_eq!(actuator.stats().snapshot().errors, 0);
}

#[test]
fn failures_are_counted_once() {
	let (device, reply) = scripted();
	let actuator = actuator(device);
	actuator.connect("mock", 115_200).unwrap();

	*reply.lock().unwrap() = vec!["ACK"];
	let err = actuator.move_to("LEFT").unwrap_err();
	assert!(err.is_timeout());
	assert_eq!(err.result().map(|r| r.lines().len()), Some(1));

	*reply.lock().unwrap() = vec!["ERROR: Servo movement failed", "READY"];
	assert!(actuator.self_test().is_err());

	let stats = actuator.stats().snapshot();
	assert_eq!(stats.errors, 2);
	assert_eq!(stats.left_moves, 0);
}

#[test]
fn probe_when_disconnected_fails_fast() {
	let device = Mock::firmware();
	let actuator = actuator(device.clone());

	let start = Instant::now();
	let err = actuator.probe().unwrap_err();
	assert!(start.elapsed() < Duration::from_millis(100));
	assert!(err.is_unreachable());
	assert!(device.commands().is_empty());

	// Probing never touches the statistics.
	assert_eq!(actuator.stats().snapshot().errors, 0);
}

#[test]
fn probe_requires_the_affirmative_marker() {
	let (device, _) = scripted();
	let mut options = options();
	options.affirmative_marker("Free Memory:");
	let actuator = Actuator::new(
		MockConnector::new(device),
		options,
		Arc::new(Statistics::new()),
	);
	// Connecting probes with the same marker.
	assert!(actuator.connect("mock", 115_200).is_err());
	assert_eq!(actuator.state(), ConnectionState::Faulted);
	assert!(matches!(
		actuator.probe(),
		Err(ActuationError::NotConnected(e)) if e.state() == ConnectionState::Faulted
	));

	let actuator = self::actuator(Mock::firmware());
	actuator.connect("mock", 115_200).unwrap();
	assert!(actuator.probe().unwrap().is_affirmed_by("Free Memory:"));
}

#[test]
fn unaffirmed_probe_is_reported() {
	let probes = Arc::new(AtomicUsize::new(0));
	let count = Arc::clone(&probes);
	// Healthy while connecting, unhealthy afterwards.
	let device = Mock::with_responder(move |_| {
		let status = if count.fetch_add(1, Ordering::SeqCst) == 0 {
			"System Ready: YES"
		} else {
			"System Ready: NO"
		};
		vec![status.to_string(), "READY".to_string()]
	});
	let actuator = actuator(device);
	actuator.connect("mock", 115_200).unwrap();

	match actuator.probe() {
		Err(ActuationError::ProbeNotAffirmed(e)) => {
			assert_eq!(e.result().lines(), ["System Ready: NO", "READY"])
		}
		other => panic!("unexpected outcome: {other:?}"),
	}
	assert_eq!(probes.load(Ordering::SeqCst), 2);
	assert!(actuator.is_connected());
	assert_eq!(actuator.stats().snapshot().errors, 0);
}

#[test]
fn failed_connect_leaves_actuator_faulted() {
	let mut options = options();
	options
		.max_attempts(5)
		.retry_pause(Duration::from_millis(10));
	let actuator = Actuator::new(
		MockConnector::unavailable(),
		options,
		Arc::new(Statistics::new()),
	);
	let err = actuator.connect("/dev/ttyACM0", 115_200).unwrap_err();
	assert_eq!(err.attempts(), 5);
	assert_eq!(actuator.connection().connector().attempts(), 5);
	assert_eq!(actuator.status().state, ConnectionState::Faulted);

	let err = actuator.move_to("LEFT").unwrap_err();
	assert!(err.is_unreachable());
	assert_eq!(actuator.stats().snapshot().errors, 1);
}

#[test]
fn channel_fault_is_reported_as_not_connected() {
	let device = Mock::firmware();
	let actuator = actuator(device.clone());
	actuator.connect("mock", 115_200).unwrap();

	device.write_error(Some(std::io::Error::new(
		std::io::ErrorKind::BrokenPipe,
		"unplugged",
	)));
	match actuator.move_to("RIGHT") {
		Err(ActuationError::NotConnected(e)) => {
			assert_eq!(e.state(), ConnectionState::Faulted)
		}
		other => panic!("unexpected outcome: {other:?}"),
	}
	assert!(!actuator.is_connected());

	// Nothing more is written until the actuator reconnects.
	assert!(actuator.move_to("LEFT").is_err());
	assert_eq!(device.commands(), ["STATUS"]);
	assert_eq!(actuator.stats().snapshot().errors, 2);

	actuator.connect("mock", 115_200).unwrap();
	actuator.move_to("LEFT").unwrap();
	assert_eq!(actuator.stats().snapshot().left_moves, 1);
}

#[test]
fn disconnect_is_idempotent() {
	let actuator = actuator(Mock::firmware());
	actuator.connect("mock", 115_200).unwrap();
	actuator.disconnect();
	actuator.disconnect();
	assert_eq!(actuator.state(), ConnectionState::Disconnected);
	assert!(actuator.self_test().unwrap_err().is_unreachable());
}

#[test]
fn concurrent_moves_are_serialised() {
	const THREADS: usize = 8;
	let device = Mock::firmware();
	device.set_response_delay(Duration::from_millis(5));
	let actuator = Arc::new(actuator(device.clone()));
	actuator.connect("mock", 115_200).unwrap();

	let handles: Vec<_> = (0..THREADS)
		.map(|i| {
			let actuator = Arc::clone(&actuator);
			thread::spawn(move || {
				let direction = if i % 2 == 0 { "LEFT" } else { "RIGHT" };
				actuator.move_to(direction)
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap().unwrap();
	}

	let commands = device.commands();
	assert_eq!(commands.len(), THREADS + 1);
	assert_eq!(commands.iter().filter(|c| *c == "LEFT").count(), THREADS / 2);
	assert_eq!(device.overlapping_writes(), 0);

	let stats = actuator.stats().snapshot();
	assert_eq!(stats.left_moves as usize, THREADS / 2);
	assert_eq!(stats.right_moves as usize, THREADS / 2);
	assert_eq!(stats.errors, 0);
}

#[test]
fn status_reads_do_not_wait_for_commands() {
	let device = Mock::firmware();
	device.set_response_delay(Duration::from_millis(50));
	let actuator = Arc::new(actuator(device));
	actuator.connect("mock", 115_200).unwrap();

	let mover = {
		let actuator = Arc::clone(&actuator);
		thread::spawn(move || actuator.move_to("LEFT"))
	};
	thread::sleep(Duration::from_millis(10));
	let start = Instant::now();
	let status = actuator.status();
	assert!(start.elapsed() < Duration::from_millis(30));
	assert_eq!(status.state, ConnectionState::Connected);

	mover.join().unwrap().unwrap();
	assert_eq!(actuator.status().stats.left_moves, 1);
}

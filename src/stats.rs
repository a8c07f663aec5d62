//! Counters describing what the sorter has done since it started.
//!
//! Every counter is updated atomically, so [`Statistics`] can be shared freely
//! between threads and read at any time without blocking a command in
//! progress.

use crate::sorting::SafetyLevel;
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration, Instant, SystemTime},
};

/// Define the [`Counter`] enum, the atomic storage behind it, and the
/// [`Snapshot`] of all counters, from a single list of counter names.
macro_rules! define_counters {
	(
		$(
			$(#[doc = $doc:literal])*
			$name:ident
		),+
		$(,)?
	) => {
		paste::paste! {
			/// A statistic tracked by [`Statistics`].
			#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
			pub enum Counter {
				$(
					$(#[doc = $doc])*
					[<$name:camel>],
				)+
			}

			impl Counter {
				/// Every counter, in the order they are reported.
				pub const ALL: &'static [Counter] = &[$(Counter::[<$name:camel>]),+];

				/// The counter's snake case name.
				pub const fn name(self) -> &'static str {
					match self {
						$(Counter::[<$name:camel>] => stringify!($name),)+
					}
				}
			}

			#[derive(Debug, Default)]
			struct Counters {
				$($name: AtomicU64,)+
			}

			impl Counters {
				fn get(&self, counter: Counter) -> &AtomicU64 {
					match counter {
						$(Counter::[<$name:camel>] => &self.$name,)+
					}
				}

				fn snapshot(&self, started_at: SystemTime, uptime: Duration) -> Snapshot {
					Snapshot {
						$($name: self.$name.load(Ordering::SeqCst),)+
						started_at,
						uptime,
					}
				}
			}

			/// The value of every counter at one point in time.
			///
			/// Each counter is read atomically, but the counters are not read as
			/// a group: a command completing during the snapshot may be
			/// reflected in some counters and not others.
			#[derive(Debug, Copy, Clone, PartialEq, Eq)]
			pub struct Snapshot {
				$(
					$(#[doc = $doc])*
					pub $name: u64,
				)+
				/// When collection started.
				pub started_at: SystemTime,
				/// How long statistics had been collected when the snapshot was taken.
				pub uptime: Duration,
			}

			impl Snapshot {
				/// The value of `counter`.
				pub fn get(&self, counter: Counter) -> u64 {
					match counter {
						$(Counter::[<$name:camel>] => self.$name,)+
					}
				}
			}
		}
	};
}

define_counters! {
	/// Items classified.
	total_processed,
	/// Items classified as safe to shred.
	safe,
	/// Items classified as requiring preprocessing.
	needs_preprocessing,
	/// Items classified as not to be shredded.
	do_not_process,
	/// Items classified as to be discarded.
	discarded,
	/// Successful moves to the left.
	left_moves,
	/// Successful moves to the right.
	right_moves,
	/// Failed commands and classifications.
	errors,
}

impl std::fmt::Display for Counter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Thread-safe counters of sorting activity.
#[derive(Debug)]
pub struct Statistics {
	counters: Counters,
	/// Monotonic start, for the uptime.
	started: Instant,
	/// Wall clock start, for reporting.
	started_at: SystemTime,
}

impl Statistics {
	/// Create statistics with every counter at zero, starting now.
	pub fn new() -> Self {
		Statistics {
			counters: Counters::default(),
			started: Instant::now(),
			started_at: SystemTime::now(),
		}
	}

	/// Increment `counter` by one.
	pub fn record(&self, counter: Counter) {
		self.counters.get(counter).fetch_add(1, Ordering::SeqCst);
	}

	/// Count a classified item under its safety level.
	pub fn record_classification(&self, level: SafetyLevel) {
		self.record(Counter::TotalProcessed);
		self.record(level.counter());
	}

	/// The current value of `counter`.
	pub fn get(&self, counter: Counter) -> u64 {
		self.counters.get(counter).load(Ordering::SeqCst)
	}

	/// The time elapsed since collection started.
	pub fn uptime(&self) -> Duration {
		self.started.elapsed()
	}

	/// When collection started.
	pub fn started_at(&self) -> SystemTime {
		self.started_at
	}

	/// Read every counter.
	pub fn snapshot(&self) -> Snapshot {
		self.counters.snapshot(self.started_at, self.uptime())
	}
}

impl Default for Statistics {
	fn default() -> Self {
		Statistics::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::{sync::Arc, thread};

	#[test]
	fn starts_at_zero() {
		let stats = Statistics::new();
		let snapshot = stats.snapshot();
		for &counter in Counter::ALL {
			assert_eq!(snapshot.get(counter), 0, "{counter}");
		}
		assert!(snapshot.uptime <= stats.uptime());
		assert_eq!(snapshot.started_at, stats.started_at());
	}

	#[test]
	fn counters_are_independent() {
		let stats = Statistics::new();
		stats.record(Counter::LeftMoves);
		stats.record(Counter::LeftMoves);
		stats.record(Counter::Errors);

		let snapshot = stats.snapshot();
		assert_eq!(snapshot.left_moves, 2);
		assert_eq!(snapshot.errors, 1);
		assert_eq!(snapshot.right_moves, 0);
		assert_eq!(stats.get(Counter::LeftMoves), 2);
	}

	#[test]
	fn classifications_count_towards_the_total() {
		let stats = Statistics::new();
		stats.record_classification(SafetyLevel::SafeToShred);
		stats.record_classification(SafetyLevel::Discard);
		stats.record_classification(SafetyLevel::Discard);

		let snapshot = stats.snapshot();
		assert_eq!(snapshot.total_processed, 3);
		assert_eq!(snapshot.safe, 1);
		assert_eq!(snapshot.discarded, 2);
		assert_eq!(snapshot.needs_preprocessing, 0);
	}

	#[test]
	fn names_match_fields() {
		assert_eq!(Counter::TotalProcessed.name(), "total_processed");
		assert_eq!(Counter::DoNotProcess.to_string(), "do_not_process");
		assert_eq!(Counter::ALL.len(), 8);
	}

	#[test]
	fn concurrent_increments_are_not_lost() {
		const THREADS: u64 = 8;
		const PER_THREAD: u64 = 1000;
		let stats = Arc::new(Statistics::new());
		let handles: Vec<_> = (0..THREADS)
			.map(|_| {
				let stats = Arc::clone(&stats);
				thread::spawn(move || {
					for _ in 0..PER_THREAD {
						stats.record(Counter::TotalProcessed);
						stats.record(Counter::Safe);
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		let snapshot = stats.snapshot();
		assert_eq!(snapshot.total_processed, THREADS * PER_THREAD);
		assert_eq!(snapshot.safe, THREADS * PER_THREAD);
	}
}

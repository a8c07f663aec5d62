//! A serial command link for driving a servo sorting actuator.
//!
//! The actuator's firmware reads one command per line (`LEFT`, `RIGHT`,
//! `CENTER`, `TEST`, or `STATUS`), answers with a few lines of text, and
//! prints `READY` once it has finished. This crate owns that conversation:
//!
//!   * an [`Actuator`] validates requests, sends them one at a time no matter
//!     how many threads ask, and turns the device's answer into a `Result`,
//!   * a [`ConnectionManager`](connection::ConnectionManager) opens the port,
//!     waits for the device to boot, and retries until the device answers a
//!     status probe,
//!   * [`Statistics`](stats::Statistics) count what has been sorted, and
//!   * a [`Sorter`](sorting::Sorter) ties an external classifier to the
//!     actuator.
//!
//! ```rust,no_run
//! use sortlink::{Actuator, LinkOptions};
//!
//! # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let actuator = Actuator::serial(LinkOptions::new());
//! actuator.connect("/dev/ttyACM0", LinkOptions::DEFAULT_BAUD_RATE)?;
//! actuator.self_test()?;
//! actuator.move_to("RIGHT")?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]

pub mod actuator;
pub mod backend;
pub mod channel;
pub mod command;
pub mod connection;
pub mod error;
pub mod options;
pub mod protocol;
pub mod response;
pub mod sorting;
pub mod stats;

pub use actuator::{Actuator, Status};
pub use command::{Command, CommandFrame, Direction};
pub use connection::{ConnectionManager, ConnectionState};
pub use options::LinkOptions;
pub use response::{CommandResult, Termination};

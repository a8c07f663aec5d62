//! Classifying an item and sorting it with the actuator.
//!
//! Classification is done by an external service behind the [`Classifier`]
//! trait. A [`Sorter`] runs one cycle per item: it refuses to start if the
//! device is unreachable, classifies the item without holding the device,
//! records the classification, and then moves the servo in the direction the
//! classification chose.

use crate::{
	actuator::Actuator,
	backend::{Connect, SerialConnector},
	command::Direction,
	error::{ClassificationError, NotConnectedError, PartialFailureError, SortError},
	response::CommandResult,
	stats::Counter,
};
use std::{fmt, path::Path, str::FromStr, sync::Arc};

/// How an item may be handled by the shredder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
	/// The item can be shredded as is.
	SafeToShred,
	/// The item must be prepared before shredding.
	RequiresPreprocessing,
	/// The item must not be shredded.
	DoNotShred,
	/// The item should be thrown away.
	Discard,
}

impl SafetyLevel {
	/// Every safety level.
	pub const ALL: [SafetyLevel; 4] = [
		SafetyLevel::SafeToShred,
		SafetyLevel::RequiresPreprocessing,
		SafetyLevel::DoNotShred,
		SafetyLevel::Discard,
	];

	/// The label used by the classification service.
	pub const fn label(self) -> &'static str {
		match self {
			SafetyLevel::SafeToShred => "Safe to Shred",
			SafetyLevel::RequiresPreprocessing => "Requires Preprocessing",
			SafetyLevel::DoNotShred => "Do Not Shred",
			SafetyLevel::Discard => "Discard",
		}
	}

	/// The statistics counter for items at this level.
	pub const fn counter(self) -> Counter {
		match self {
			SafetyLevel::SafeToShred => Counter::Safe,
			SafetyLevel::RequiresPreprocessing => Counter::NeedsPreprocessing,
			SafetyLevel::DoNotShred => Counter::DoNotProcess,
			SafetyLevel::Discard => Counter::Discarded,
		}
	}
}

impl fmt::Display for SafetyLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for SafetyLevel {
	type Err = ClassificationError;

	/// Parse a label, ignoring case and surrounding whitespace.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let label = s.trim();
		SafetyLevel::ALL
			.into_iter()
			.find(|level| level.label().eq_ignore_ascii_case(label))
			.ok_or_else(|| ClassificationError::new(format!("unknown safety level {s:?}")))
	}
}

/// The classification of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
	item_name: String,
	safety_level: SafetyLevel,
	direction: Direction,
	confidence: f64,
	hazards: Vec<String>,
	notes: String,
}

impl Analysis {
	/// Create an analysis with full confidence, no hazards, and no notes.
	pub fn new<S: Into<String>>(item_name: S, safety_level: SafetyLevel, direction: Direction) -> Self {
		Analysis {
			item_name: item_name.into(),
			safety_level,
			direction,
			confidence: 1.0,
			hazards: Vec::new(),
			notes: String::new(),
		}
	}

	/// Set the confidence, clamped to `0.0..=1.0`. NaN is treated as `0.0`.
	pub fn with_confidence(mut self, confidence: f64) -> Self {
		self.confidence = if confidence.is_nan() {
			0.0
		} else {
			confidence.clamp(0.0, 1.0)
		};
		self
	}

	/// Set the hazards identified in the item.
	pub fn with_hazards<I, S>(mut self, hazards: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.hazards = hazards.into_iter().map(Into::into).collect();
		self
	}

	/// Set free-form notes about the item.
	pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
		self.notes = notes.into();
		self
	}

	/// What the item was identified as.
	pub fn item_name(&self) -> &str {
		&self.item_name
	}

	/// How the item may be handled.
	pub fn safety_level(&self) -> SafetyLevel {
		self.safety_level
	}

	/// Where the item should be sorted.
	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// How confident the classifier was, between 0 and 1.
	pub fn confidence(&self) -> f64 {
		self.confidence
	}

	/// Hazards identified in the item.
	pub fn hazards(&self) -> &[String] {
		&self.hazards
	}

	/// Free-form notes about the item.
	pub fn notes(&self) -> &str {
		&self.notes
	}
}

/// An external service that classifies an image of an item.
pub trait Classifier {
	/// Classify the item pictured in `image`.
	fn classify(&self, image: &Path) -> Result<Analysis, ClassificationError>;
}

impl<F> Classifier for F
where
	F: Fn(&Path) -> Result<Analysis, ClassificationError>,
{
	fn classify(&self, image: &Path) -> Result<Analysis, ClassificationError> {
		self(image)
	}
}

/// A successfully sorted item.
#[derive(Debug, Clone, PartialEq)]
pub struct Sorted {
	/// The item's classification.
	pub analysis: Analysis,
	/// The device's response to the move.
	pub result: CommandResult,
}

/// Runs the classify-then-move cycle for each item.
pub struct Sorter<K, C: Connect = SerialConnector> {
	classifier: K,
	actuator: Arc<Actuator<C>>,
}

impl<K, C: Connect> fmt::Debug for Sorter<K, C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Sorter")
			.field("actuator", &self.actuator)
			.finish_non_exhaustive()
	}
}

impl<K: Classifier, C: Connect> Sorter<K, C> {
	/// Create a sorter that classifies with `classifier` and moves items with
	/// `actuator`.
	pub fn new(classifier: K, actuator: Arc<Actuator<C>>) -> Self {
		Sorter {
			classifier,
			actuator,
		}
	}

	/// The actuator used to move items.
	pub fn actuator(&self) -> &Arc<Actuator<C>> {
		&self.actuator
	}

	/// Classify the item pictured in `image` and sort it.
	///
	/// Nothing is classified if the device is not connected. A failed
	/// classification is counted as an error. A failed move after a
	/// successful classification is reported as a [`PartialFailureError`]
	/// carrying the analysis; it is counted as a single error.
	pub fn sort(&self, image: &Path) -> Result<Sorted, SortError> {
		let state = self.actuator.state();
		if !state.is_connected() {
			log::error!("cannot sort {}: device is {state}", image.display());
			return Err(NotConnectedError::new(state).into());
		}

		log::info!("classifying {}", image.display());
		let analysis = match self.classifier.classify(image) {
			Ok(analysis) => analysis,
			Err(e) => {
				log::error!("failed to classify {}: {e}", image.display());
				self.actuator.stats().record(Counter::Errors);
				return Err(e.into());
			}
		};
		self.actuator
			.stats()
			.record_classification(analysis.safety_level());
		log::info!(
			"{} is {:?} ({}, confidence {:.2}), sorting {}",
			image.display(),
			analysis.item_name(),
			analysis.safety_level(),
			analysis.confidence(),
			analysis.direction()
		);

		match self.actuator.move_direction(analysis.direction()) {
			Ok(result) => Ok(Sorted { analysis, result }),
			Err(e) => Err(PartialFailureError::new(analysis, e).into()),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		backend::{Mock, MockConnector},
		error::ActuationError,
		options::LinkOptions,
		stats::Statistics,
	};
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration,
	};

	fn actuator(device: Mock) -> Arc<Actuator<MockConnector>> {
		let mut options = LinkOptions::new();
		options
			.grace_period(Duration::ZERO)
			.max_attempts(1)
			.response_timeout(Duration::from_millis(100));
		Arc::new(Actuator::new(
			MockConnector::new(device),
			options,
			Arc::new(Statistics::new()),
		))
	}

	fn paper(_: &Path) -> Result<Analysis, ClassificationError> {
		Ok(Analysis::new("paper", SafetyLevel::SafeToShred, Direction::Left).with_confidence(0.9))
	}

	#[test]
	fn safety_levels_parse_from_labels() {
		for level in SafetyLevel::ALL {
			assert_eq!(level.label().parse::<SafetyLevel>().unwrap(), level);
		}
		assert_eq!(
			" do not shred ".parse::<SafetyLevel>().unwrap(),
			SafetyLevel::DoNotShred
		);
		assert!("Shred Maybe".parse::<SafetyLevel>().is_err());
	}

	#[test]
	fn confidence_is_clamped() {
		let analysis = Analysis::new("can", SafetyLevel::Discard, Direction::Right);
		assert_eq!(analysis.clone().with_confidence(1.5).confidence(), 1.0);
		assert_eq!(analysis.clone().with_confidence(-1.0).confidence(), 0.0);
		assert_eq!(analysis.with_confidence(f64::NAN).confidence(), 0.0);
	}

	#[test]
	fn sorts_a_classified_item() {
		let device = Mock::firmware();
		let actuator = actuator(device.clone());
		actuator.connect("mock", 115_200).unwrap();
		let sorter = Sorter::new(paper, Arc::clone(&actuator));

		let sorted = sorter.sort(Path::new("item.jpg")).unwrap();
		assert_eq!(sorted.analysis.item_name(), "paper");
		assert!(sorted.result.is_success());
		assert_eq!(device.commands(), ["STATUS", "LEFT"]);

		let snapshot = actuator.stats().snapshot();
		assert_eq!(snapshot.total_processed, 1);
		assert_eq!(snapshot.safe, 1);
		assert_eq!(snapshot.left_moves, 1);
		assert_eq!(snapshot.errors, 0);
	}

	#[test]
	fn unreachable_device_skips_classification() {
		let calls = AtomicUsize::new(0);
		let classifier = |image: &Path| {
			calls.fetch_add(1, Ordering::SeqCst);
			paper(image)
		};
		let actuator = actuator(Mock::firmware());
		let sorter = Sorter::new(classifier, Arc::clone(&actuator));

		let err = sorter.sort(Path::new("item.jpg")).unwrap_err();
		assert!(err.is_unreachable());
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert_eq!(actuator.stats().snapshot().total_processed, 0);
	}

	#[test]
	fn failed_classification_is_counted() {
		let device = Mock::firmware();
		let actuator = actuator(device.clone());
		actuator.connect("mock", 115_200).unwrap();
		let sorter = Sorter::new(
			|_: &Path| -> Result<Analysis, ClassificationError> {
				Err(ClassificationError::new("service unavailable"))
			},
			Arc::clone(&actuator),
		);

		let err = sorter.sort(Path::new("item.jpg")).unwrap_err();
		assert!(matches!(err, SortError::Classification(_)));
		assert_eq!(device.commands(), ["STATUS"]);
		let snapshot = actuator.stats().snapshot();
		assert_eq!(snapshot.errors, 1);
		assert_eq!(snapshot.total_processed, 0);
	}

	#[test]
	fn failed_move_is_a_partial_failure() {
		let device = Mock::with_responder(|command| {
			let reply = if command == "STATUS" {
				"System Ready: YES"
			} else {
				"ERROR: Servo movement failed"
			};
			vec![reply.to_string(), "READY".to_string()]
		});
		let actuator = actuator(device);
		actuator.connect("mock", 115_200).unwrap();
		let sorter = Sorter::new(paper, Arc::clone(&actuator));

		let err = match sorter.sort(Path::new("item.jpg")) {
			Err(SortError::PartialFailure(e)) => e,
			other => panic!("unexpected outcome: {other:?}"),
		};
		assert_eq!(err.analysis().item_name(), "paper");
		assert!(matches!(err.cause(), ActuationError::Device(_)));

		let snapshot = actuator.stats().snapshot();
		assert_eq!(snapshot.total_processed, 1);
		assert_eq!(snapshot.safe, 1);
		assert_eq!(snapshot.left_moves, 0);
		assert_eq!(snapshot.errors, 1);
	}
}

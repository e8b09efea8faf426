//! Binary search for the threshold that gives a wanted compression ratio.

use tracing::{debug, info};

use super::error::TuneError;
use super::metric::ErrorMetric;
use super::{Builder, PixelSource};

pub const DEFAULT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Searches for a threshold whose tree reaches a target compression ratio
/// (`1 - leaves / pixels`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdTuner {
	pub metric: ErrorMetric,
	pub min_block_size: u32,
	/// Largest accepted distance between the reached and wanted ratio.
	pub tolerance: f64,
	/// Number of trees built before giving up.
	pub max_iterations: usize,
}

/// Result of a threshold search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TuneOutcome {
	/// Last threshold tried; the accepted one if `converged`.
	pub threshold: f64,
	/// Compression ratio reached with `threshold`.
	pub ratio: f64,
	/// Number of trees built.
	pub iterations: usize,
	/// Whether `ratio` is within tolerance of the target.
	pub converged: bool,
}

struct SearchState {
	low: f64,
	high: f64,
	best: TuneOutcome,
}

impl ThresholdTuner {
	pub fn new(metric: ErrorMetric, min_block_size: u32) -> Self {
		Self {
			metric,
			min_block_size,
			tolerance: DEFAULT_TOLERANCE,
			max_iterations: DEFAULT_MAX_ITERATIONS,
		}
	}

	/// Bisects the metric's threshold range until a tree of `source` has a
	/// compression ratio within tolerance of `desired_ratio`.
	///
	/// Raising the threshold can only merge blocks, so the ratio never drops
	/// as the threshold grows: a ratio below target moves the search up, one
	/// above target moves it down. Every tree is dropped as soon as its
	/// leaves are counted. If the iterations run out, the last threshold
	/// tried is returned with `converged` unset.
	pub fn tune<S: PixelSource + ?Sized>(
		&self,
		source: &S,
		desired_ratio: f64
	) -> Result<TuneOutcome, TuneError> {
		if !(desired_ratio > 0. && desired_ratio <= 1.) {
			return Err(TuneError::InvalidRatio(desired_ratio));
		}
		if !(self.tolerance >= 0.) {
			return Err(TuneError::InvalidTolerance(self.tolerance));
		}
		let bounds = self.metric.search_bounds();
		let pixels = source.width() as f64 * source.height() as f64;
		let mut state = SearchState {
			low: bounds.low,
			high: bounds.high,
			best: TuneOutcome { threshold: bounds.low, ratio: 0., iterations: 0, converged: false },
		};

		for iteration in 1..=self.max_iterations {
			let mid = (state.low + state.high) / 2.;
			let leaves = Builder::new(mid, self.min_block_size, self.metric)
				.build(source)?
				.leaf_count();
			let ratio = 1. - leaves as f64 / pixels;
			debug!(iteration, threshold = mid, leaves, ratio, "tried threshold");

			let converged = (ratio - desired_ratio).abs() <= self.tolerance;
			state.best = TuneOutcome { threshold: mid, ratio, iterations: iteration, converged };
			if converged {
				break;
			}
			if ratio < desired_ratio {
				state.low = mid;
			} else {
				state.high = mid;
			}
		}

		let best = state.best;
		info!(
			metric = %self.metric,
			target = desired_ratio,
			threshold = best.threshold,
			ratio = best.ratio,
			iterations = best.iterations,
			converged = best.converged,
			"threshold search finished"
		);
		Ok(best)
	}
}

//! Block homogeneity metrics.
//!
//! Every metric scores how far a block is from being a flat patch of its
//! average color; lower is more uniform. A block with no pixels scores 0.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use super::{Color, PixelSource, Region};

/// SSIM stabilizer for the luminance term (`(0.01 * 255)^2`).
const SSIM_C1: f64 = 6.5025;
/// SSIM stabilizer for the contrast/structure term (`(0.03 * 255)^2`).
const SSIM_C2: f64 = 58.5225;
/// Channel variances below this count as a flat channel.
const SSIM_VARIANCE_FLOOR: f64 = 1e-3;

/// Metric used to decide whether a block is uniform enough to be a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
	/// Mean squared deviation from the average, averaged over channels.
	#[serde(alias = "var")]
	Variance,
	/// Mean absolute deviation from the average, averaged over channels.
	#[serde(alias = "mad")]
	MeanAbsoluteDeviation,
	/// Spread between the darkest and brightest value, averaged over channels.
	#[serde(alias = "max_pixel_difference", alias = "range")]
	MaxChannelRange,
	/// Shannon entropy of each channel's histogram, averaged over channels.
	Entropy,
	/// `1 - SSIM` against a flat block of the average color.
	#[serde(alias = "ssim")]
	StructuralSimilarity,
}

/// Interval a threshold search starts from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchBounds {
	pub low: f64,
	pub high: f64,
}

/// Threshold search interval of each metric.
const SEARCH_BOUNDS: [(ErrorMetric, SearchBounds); 5] = [
	(ErrorMetric::Variance, SearchBounds { low: 0., high: 65025. }),
	(ErrorMetric::MeanAbsoluteDeviation, SearchBounds { low: 0., high: 65025. }),
	(ErrorMetric::MaxChannelRange, SearchBounds { low: 0., high: 65025. }),
	(ErrorMetric::Entropy, SearchBounds { low: 0., high: 1. }),
	(ErrorMetric::StructuralSimilarity, SearchBounds { low: 0., high: 1. }),
];

impl ErrorMetric {
	pub const ALL: [ErrorMetric; 5] = [
		ErrorMetric::Variance,
		ErrorMetric::MeanAbsoluteDeviation,
		ErrorMetric::MaxChannelRange,
		ErrorMetric::Entropy,
		ErrorMetric::StructuralSimilarity,
	];

	/// Short name, as accepted by `from_str`.
	pub fn name(self) -> &'static str {
		match self {
			ErrorMetric::Variance => "variance",
			ErrorMetric::MeanAbsoluteDeviation => "mad",
			ErrorMetric::MaxChannelRange => "max-channel-range",
			ErrorMetric::Entropy => "entropy",
			ErrorMetric::StructuralSimilarity => "ssim",
		}
	}

	/// Range of thresholds worth searching for this metric.
	pub fn search_bounds(self) -> SearchBounds {
		SEARCH_BOUNDS.iter()
			.find(|(m, _)| *m == self)
			.map(|(_, b)| *b)
			.unwrap_or(SearchBounds { low: 0., high: 65025. })
	}

	/// Scores `region` of `source` against its average color `average`.
	pub fn compute_error<S: PixelSource + ?Sized>(
		self,
		source: &S,
		region: Region,
		average: Color
	) -> f64 {
		if region.area() == 0 {
			return 0.;
		}
		match self {
			ErrorMetric::Variance => deviation(source, region, average, |d| d * d),
			ErrorMetric::MeanAbsoluteDeviation => deviation(source, region, average, f64::abs),
			ErrorMetric::MaxChannelRange => max_channel_range(source, region),
			ErrorMetric::Entropy => entropy(source, region),
			ErrorMetric::StructuralSimilarity => structural_similarity(source, region, average),
		}
	}
}

impl fmt::Display for ErrorMetric {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A metric name that isn't recognized.
#[derive(Debug, Error)]
#[error("unknown error metric {0:?}; expected variance, mad, max-channel-range, entropy, ssim or 1-5")]
pub struct ParseMetricError(String);

impl FromStr for ErrorMetric {
	type Err = ParseMetricError;

	/// Accepts the metric names (with `-` or `_`, any case) and the numbers
	/// 1 to 5 in the order the metrics are listed in.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
			"1" | "var" | "variance" => Ok(ErrorMetric::Variance),
			"2" | "mad" | "mean-absolute-deviation" => Ok(ErrorMetric::MeanAbsoluteDeviation),
			"3" | "range" | "max-channel-range" | "max-pixel-difference" =>
				Ok(ErrorMetric::MaxChannelRange),
			"4" | "entropy" => Ok(ErrorMetric::Entropy),
			"5" | "ssim" | "structural-similarity" => Ok(ErrorMetric::StructuralSimilarity),
			_ => Err(ParseMetricError(s.to_owned())),
		}
	}
}

/// Mean of `f(pixel - average)` over pixels and channels.
fn deviation<S: PixelSource + ?Sized>(
	source: &S,
	region: Region,
	average: Color,
	f: impl Fn(f64) -> f64
) -> f64 {
	let sum: f64 = region.pixels(source)
		.map(|p| (0..3).map(|c| f(p.0[c] as f64 - average.0[c] as f64)).sum::<f64>())
		.sum();
	sum / region.area() as f64 / 3.
}

fn max_channel_range<S: PixelSource + ?Sized>(source: &S, region: Region) -> f64 {
	let (min, max) = region.pixels(source).fold(
		([u8::MAX; 3], [u8::MIN; 3]),
		|(mut min, mut max), p| {
			for c in 0..3 {
				min[c] = min[c].min(p.0[c]);
				max[c] = max[c].max(p.0[c]);
			}
			(min, max)
		}
	);
	(0..3).map(|c| (max[c] - min[c]) as f64).sum::<f64>() / 3.
}

fn entropy<S: PixelSource + ?Sized>(source: &S, region: Region) -> f64 {
	let mut histograms = [[0u32; 256]; 3];
	for p in region.pixels(source) {
		for c in 0..3 {
			histograms[c][p.0[c] as usize] += 1;
		}
	}
	let total = region.area() as f64;
	let channel_entropy = |hist: &[u32; 256]| -> f64 {
		hist.iter()
			.filter(|&&n| n > 0)
			.map(|&n| {
				let p = n as f64 / total;
				-p * p.log2()
			})
			.sum()
	};
	histograms.iter().map(channel_entropy).sum::<f64>() / 3.
}

fn structural_similarity<S: PixelSource + ?Sized>(
	source: &S,
	region: Region,
	average: Color
) -> f64 {
	let mut sum = [0f64; 3];
	let mut sum_sq = [0f64; 3];
	let mut covar = [0f64; 3];
	for p in region.pixels(source) {
		for c in 0..3 {
			let v = p.0[c] as f64;
			sum[c] += v;
			sum_sq[c] += v * v;
			covar[c] += v * average.0[c] as f64;
		}
	}
	let n = region.area() as f64;
	let ssim = (0..3).map(|c| {
		let avg = average.0[c] as f64;
		let mean = sum[c] / n;
		let luminance = (2. * mean * avg + SSIM_C1) / (mean * mean + avg * avg + SSIM_C1);
		let variance = sum_sq[c] / n - mean * mean;
		if variance < SSIM_VARIANCE_FLOOR {
			// A flat channel has the same (zero) structure as the flat
			// reconstruction, so only luminance can differ.
			return luminance;
		}
		let covariance = covar[c] / n - mean * avg;
		luminance * (2. * covariance + SSIM_C2) / (variance + SSIM_C2)
	}).sum::<f64>() / 3.;
	1. - ssim
}

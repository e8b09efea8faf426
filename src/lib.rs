//! Lossy image compression by quadtree decomposition.
//!
//! An image is split into four blocks, and those blocks into four more, until
//! every block is uniform enough under the chosen `ErrorMetric` (or too small
//! to split). Each final block is stored as its average color.

pub mod config;
pub mod node;
pub mod output;

pub use config::{CompressConfig, ConfigError};
pub use node::*;
pub use node::error::{BuildError, DrawError, TilingError, TuneError};
pub use node::frames::{FrameSampler, SamplerConfig};
pub use node::metric::ErrorMetric;
pub use node::tune::{ThresholdTuner, TuneOutcome};

use ::image::RgbImage;
use thiserror::Error;

/// Any failure of `compress`.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error(transparent)]
	Tune(#[from] TuneError),
}

/// A finished compression run.
#[derive(Debug)]
pub struct CompressionResult {
	pub root: QuadtreeNode,
	pub leaf_count: usize,
	/// Levels in the tree; a lone root is depth 1.
	pub max_depth: u32,
	/// Threshold the tree was built with.
	pub threshold: f64,
	/// Search details if the threshold came from a target ratio.
	pub tuning: Option<TuneOutcome>,
	/// Snapshots of the build in traversal order; empty without animation.
	pub frames: Vec<RgbImage>,
}

impl CompressionResult {
	/// The compressed image.
	pub fn to_image(&self) -> RgbImage {
		self.root.to_image()
	}
}

/// Compresses `source` as described by `config`, ignoring its paths.
///
/// With a target ratio set, the threshold is searched for first and the
/// final tree is built once more with it, this time with frame sampling.
pub fn compress<S: PixelSource + ?Sized>(
	source: &S,
	config: &CompressConfig
) -> Result<CompressionResult, Error> {
	config.validate()?;
	let tuning = if config.tuning_enabled() {
		let tuner = ThresholdTuner::new(config.error_method, config.min_block_size);
		Some(tuner.tune(source, config.target_compression)?)
	} else {
		None
	};
	let threshold = tuning.map(|t| t.threshold).unwrap_or(config.threshold);
	let builder = Builder::new(threshold, config.min_block_size, config.error_method);

	let (root, frames) = if config.create_animation {
		let mut sampler = FrameSampler::new(source, config.sampler());
		let root = builder.build_with(source, Some(&mut sampler))?;
		(root, sampler.into_frames())
	} else {
		(builder.build(source)?, Vec::new())
	};
	Ok(CompressionResult {
		leaf_count: root.leaf_count(),
		max_depth: root.max_depth(),
		root,
		threshold,
		tuning,
		frames,
	})
}

impl node::QuadtreeNode {
	pub fn leaf_count(&self) -> usize {
		self.leaves().count()
	}

	/// Number of nodes, branches included.
	pub fn node_count(&self) -> usize {
		1 + self.children().map(QuadtreeNode::node_count).sum::<usize>()
	}

	/// Number of levels below and including this node; a leaf has 1.
	pub fn max_depth(&self) -> u32 {
		1 + self.children().map(QuadtreeNode::max_depth).max().unwrap_or(0)
	}

	/// `1 - leaves / pixels` over this node's region.
	pub fn compression_ratio(&self) -> f64 {
		1. - self.leaf_count() as f64 / self.region.area() as f64
	}
}

//! Snapshots of a quadtree while it is being built, for animating the
//! decomposition afterwards.
//!
//! The builder reports every node it finishes to a `FrameSampler`. Each
//! report is a candidate frame; the sampler keeps only some of them so that
//! memory stays bounded no matter how large the tree gets.

use ::image::imageops::{self, FilterType};
use ::image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use super::error::BuildError;
use super::{PixelSource, Region};

/// Snapshots are downscaled so that neither side exceeds this.
pub const MAX_DISPLAY_SIZE: u32 = 800;
/// Sources with more pixels than this get a reduced frame budget.
pub const LARGE_IMAGE_PIXELS: u64 = 2_000_000;
/// Color of leaf outlines.
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Thinning never starts before this many frames are captured.
const THINNING_MIN_FRAMES: usize = 10;
/// Chance of dropping a candidate once thinning is active.
const THINNING_DROP_PROBABILITY: f64 = 0.8;

/// Limits on how many snapshots are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
	/// Hard cap on captured frames.
	pub max_frames: usize,
	/// Only every `frame_skip`th candidate is considered.
	pub frame_skip: usize,
	/// Seed of the thinning RNG; equal seeds give equal frame selections.
	pub seed: u64,
}

impl Default for SamplerConfig {
	fn default() -> Self {
		Self { max_frames: 100, frame_skip: 1, seed: 0 }
	}
}

impl SamplerConfig {
	/// Tightens the limits for sources with more than `LARGE_IMAGE_PIXELS`
	/// pixels: at least every second candidate skipped, at most 50 frames.
	pub fn for_pixel_count(self, pixels: u64) -> Self {
		if pixels <= LARGE_IMAGE_PIXELS {
			return self;
		}
		Self {
			max_frames: self.max_frames.min(50),
			frame_skip: self.frame_skip.max(2),
			..self
		}
	}
}

/// Collects build snapshots within the limits of a `SamplerConfig`.
pub struct FrameSampler {
	config: SamplerConfig,
	frames: Vec<RgbImage>,
	frame_count: usize,
	total_candidates: usize,
	/// Scaled source image without outlines.
	background: RgbImage,
	/// `background` with the outlines of every leaf finished so far.
	canvas: RgbImage,
	/// Factor from source to snapshot coordinates.
	scale: f64,
	rng: StdRng,
}

impl FrameSampler {
	/// Prepares a sampler for building a tree of `source`.
	///
	/// The limits may be tightened for large sources, see
	/// `SamplerConfig::for_pixel_count`.
	pub fn new<S: PixelSource + ?Sized>(source: &S, config: SamplerConfig) -> Self {
		let pixels = source.width() as u64 * source.height() as u64;
		let mut adjusted = config.for_pixel_count(pixels);
		if adjusted != config {
			warn!(
				pixels,
				max_frames = adjusted.max_frames,
				frame_skip = adjusted.frame_skip,
				"large image, limiting animation frames"
			);
		}
		adjusted.frame_skip = adjusted.frame_skip.max(1);
		let (background, scale) = scaled_background(source);
		Self {
			config: adjusted,
			frames: Vec::new(),
			frame_count: 0,
			total_candidates: 0,
			canvas: background.clone(),
			background,
			scale,
			rng: StdRng::seed_from_u64(adjusted.seed),
		}
	}

	/// The limits in effect, after any adjustment for a large source.
	pub fn config(&self) -> SamplerConfig {
		self.config
	}

	pub fn frames(&self) -> &[RgbImage] {
		&self.frames
	}

	pub fn into_frames(self) -> Vec<RgbImage> {
		self.frames
	}

	/// Candidates seen, whether or not they were captured.
	pub fn total_candidates(&self) -> usize {
		self.total_candidates
	}

	/// Candidates counted towards `frame_skip`.
	pub fn frame_count(&self) -> usize {
		self.frame_count
	}

	/// Forgets all frames and outlines so the sampler can follow a new build
	/// of the same source.
	pub fn reset(&mut self) {
		self.frames.clear();
		self.frame_count = 0;
		self.total_candidates = 0;
		self.canvas = self.background.clone();
		self.rng = StdRng::seed_from_u64(self.config.seed);
	}

	/// Called when `region` has become a leaf.
	pub fn leaf_finalized(&mut self, region: Region) -> Result<(), BuildError> {
		self.outline(region);
		self.offer()
	}

	/// Called after each of the four children of a split has been built.
	pub fn child_finished(&mut self) -> Result<(), BuildError> {
		self.offer()
	}

	/// Called once the whole tree is built.
	pub fn build_finished(&mut self) -> Result<(), BuildError> {
		self.offer()
	}

	fn offer(&mut self) -> Result<(), BuildError> {
		self.total_candidates += 1;
		self.frame_count += 1;
		if self.frame_count % self.config.frame_skip != 0 {
			return Ok(());
		}
		if self.frames.len() >= self.config.max_frames {
			return Ok(());
		}
		let thinning = self.total_candidates > self.config.max_frames.saturating_mul(4) &&
			self.frames.len() >= THINNING_MIN_FRAMES;
		if thinning && self.rng.gen_bool(THINNING_DROP_PROBABILITY) {
			return Ok(());
		}
		let frame = self.snapshot()?;
		self.frames.push(frame);
		Ok(())
	}

	/// Copies the canvas, reporting allocation failure instead of aborting.
	fn snapshot(&mut self) -> Result<RgbImage, BuildError> {
		let exhausted = BuildError::ResourceExhausted { captured: self.frames.len() };
		let raw = self.canvas.as_raw();
		let mut buf = Vec::new();
		if buf.try_reserve_exact(raw.len()).is_err() || self.frames.try_reserve(1).is_err() {
			return Err(exhausted);
		}
		buf.extend_from_slice(raw);
		RgbImage::from_raw(self.canvas.width(), self.canvas.height(), buf).ok_or(exhausted)
	}

	/// Draws the border of `region`, scaled, onto the canvas.
	///
	/// Like the pixel grid itself, the right and bottom borders sit one
	/// pixel past the region and so coincide with the neighbors' borders.
	fn outline(&mut self, region: Region) {
		let (w, h) = self.canvas.dimensions();
		let x0 = (region.x as f64 * self.scale) as u32;
		let y0 = (region.y as f64 * self.scale) as u32;
		if x0 >= w || y0 >= h {
			return;
		}
		let x1 = (x0 + (region.width as f64 * self.scale) as u32).min(w - 1);
		let y1 = (y0 + (region.height as f64 * self.scale) as u32).min(h - 1);
		for x in x0..=x1 {
			self.canvas.put_pixel(x, y0, OUTLINE_COLOR);
			self.canvas.put_pixel(x, y1, OUTLINE_COLOR);
		}
		for y in y0..=y1 {
			self.canvas.put_pixel(x0, y, OUTLINE_COLOR);
			self.canvas.put_pixel(x1, y, OUTLINE_COLOR);
		}
	}
}

/// Copies `source` into an image no larger than `MAX_DISPLAY_SIZE` on
/// either side, keeping the aspect ratio. Also returns the scale factor.
fn scaled_background<S: PixelSource + ?Sized>(source: &S) -> (RgbImage, f64) {
	let (w, h) = (source.width(), source.height());
	let full = RgbImage::from_fn(w, h, |x, y| source.pixel_at(x, y));
	if w <= MAX_DISPLAY_SIZE && h <= MAX_DISPLAY_SIZE {
		return (full, 1.);
	}
	let scale = MAX_DISPLAY_SIZE as f64 / w.max(h) as f64;
	let scaled_w = ((w as f64 * scale) as u32).max(1);
	let scaled_h = ((h as f64 * scale) as u32).max(1);
	(imageops::resize(&full, scaled_w, scaled_h, FilterType::Triangle), scale)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::metric::ErrorMetric;
	use crate::node::tests::checkerboard;
	use crate::node::{Builder, Color};

	/// Flat source with no pixel buffer of its own.
	struct Flat(u32, u32);

	impl PixelSource for Flat {
		fn width(&self) -> u32 { self.0 }
		fn height(&self) -> u32 { self.1 }
		fn pixel_at(&self, _: u32, _: u32) -> Color { Rgb([20, 40, 60]) }
	}

	fn corners() -> RgbImage {
		RgbImage::from_fn(2, 2, |x, y| Rgb([x as u8 * 255, y as u8 * 255, 0]))
	}

	fn sample(img: &RgbImage, builder: Builder, config: SamplerConfig) -> FrameSampler {
		let mut sampler = FrameSampler::new(img, config);
		builder.build_with(img, Some(&mut sampler)).unwrap();
		sampler
	}

	#[test]
	fn fills_the_budget_when_thinning_is_inactive() {
		let config = SamplerConfig { max_frames: 5, frame_skip: 1, seed: 7 };
		let sampler = sample(&corners(), Builder::new(0., 1, ErrorMetric::Variance), config);
		// Four leaves, four finished children, one finished build.
		assert_eq!(sampler.total_candidates(), 9);
		assert!(sampler.total_candidates() < 4 * config.max_frames);
		assert_eq!(sampler.frames().len(), 5);
	}

	#[test]
	fn frame_skip_keeps_every_nth_candidate() {
		let config = SamplerConfig { max_frames: 100, frame_skip: 2, seed: 0 };
		let sampler = sample(&corners(), Builder::new(0., 1, ErrorMetric::Variance), config);
		assert_eq!(sampler.frame_count(), 9);
		assert_eq!(sampler.frames().len(), 4);
	}

	#[test]
	fn never_exceeds_max_frames() {
		let img = checkerboard(32, 32);
		let config = SamplerConfig { max_frames: 12, frame_skip: 1, seed: 3 };
		let sampler = sample(&img, Builder::new(0., 1, ErrorMetric::Variance), config);
		assert!(sampler.total_candidates() > 4 * 12);
		assert!(sampler.frames().len() <= 12);
		assert!(sampler.frames().len() >= THINNING_MIN_FRAMES);
	}

	#[test]
	fn equal_seeds_pick_equal_frames() {
		let img = checkerboard(64, 64);
		let builder = Builder::new(0., 1, ErrorMetric::Variance);
		// Only 20 frames are captured by the time thinning starts.
		let config = SamplerConfig { max_frames: 40, frame_skip: 8, seed: 99 };
		let a = sample(&img, builder, config);
		let b = sample(&img, builder, config);
		assert!(a.total_candidates() > 4 * 40);
		assert_eq!(a.frames().len(), 40);
		assert_eq!(a.frames(), b.frames());
	}

	#[test]
	fn reset_replays_the_same_frames() {
		let img = checkerboard(16, 16);
		let builder = Builder::new(0., 1, ErrorMetric::Variance);
		let config = SamplerConfig { max_frames: 20, frame_skip: 1, seed: 5 };
		let mut sampler = sample(&img, builder, config);
		let first = sampler.frames().to_vec();
		sampler.reset();
		assert_eq!(sampler.total_candidates(), 0);
		assert!(sampler.frames().is_empty());
		builder.build_with(&img, Some(&mut sampler)).unwrap();
		assert_eq!(sampler.frames(), &first[..]);
	}

	#[test]
	fn frames_show_leaf_outlines_over_the_source() {
		let img = RgbImage::from_pixel(8, 8, Rgb([0, 0, 255]));
		let config = SamplerConfig { max_frames: 10, frame_skip: 1, seed: 0 };
		let sampler = sample(&img, Builder::new(0., 1, ErrorMetric::Variance), config);
		// One leaf plus the end of the build.
		assert_eq!(sampler.frames().len(), 2);
		let frame = &sampler.frames()[0];
		assert_eq!(frame.dimensions(), (8, 8));
		assert_eq!(*frame.get_pixel(0, 0), OUTLINE_COLOR);
		assert_eq!(*frame.get_pixel(7, 3), OUTLINE_COLOR);
		assert_eq!(*frame.get_pixel(4, 4), Rgb([0, 0, 255]));
	}

	#[test]
	fn large_sources_are_downscaled() {
		let img = RgbImage::from_pixel(1000, 500, Rgb([1, 2, 3]));
		let config = SamplerConfig { max_frames: 3, frame_skip: 1, seed: 0 };
		let sampler = sample(&img, Builder::new(0., 1, ErrorMetric::Variance), config);
		assert!(sampler.frames().iter().all(|f| f.dimensions() == (800, 400)));
	}

	#[test]
	fn huge_sources_get_a_smaller_budget() {
		let source = Flat(2000, 1001);
		let sampler = FrameSampler::new(&source, SamplerConfig { max_frames: 100, frame_skip: 1, seed: 0 });
		assert_eq!(sampler.config().max_frames, 50);
		assert_eq!(sampler.config().frame_skip, 2);
		let small = SamplerConfig { max_frames: 10, frame_skip: 4, seed: 0 };
		assert_eq!(small.for_pixel_count(LARGE_IMAGE_PIXELS + 1), small);
		assert_eq!(small.for_pixel_count(10), small);
	}

	#[test]
	fn zero_frame_skip_is_treated_as_one() {
		let config = SamplerConfig { max_frames: 100, frame_skip: 0, seed: 0 };
		let sampler = sample(&corners(), Builder::new(0., 1, ErrorMetric::Variance), config);
		assert_eq!(sampler.frames().len(), 9);
	}
}

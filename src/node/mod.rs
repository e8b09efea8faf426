pub mod error;
pub mod frames;
pub mod metric;
pub mod render;
pub mod tiling;
pub mod tune;

use tracing::debug;

use error::BuildError;
use frames::FrameSampler;
use metric::ErrorMetric;

/// RGB color of a pixel or of a block average.
pub type Color = ::image::Rgb<u8>;

/// Read-only access to a rectangular buffer of RGB pixels.
pub trait PixelSource {
	fn width(&self) -> u32;
	fn height(&self) -> u32;
	/// Color of the pixel at `(x, y)`. Callers keep coordinates in bounds.
	fn pixel_at(&self, x: u32, y: u32) -> Color;
}

impl PixelSource for ::image::RgbImage {
	fn width(&self) -> u32 {
		::image::ImageBuffer::width(self)
	}

	fn height(&self) -> u32 {
		::image::ImageBuffer::height(self)
	}

	fn pixel_at(&self, x: u32, y: u32) -> Color {
		*self.get_pixel(x, y)
	}
}

/// Axis-aligned rectangle of pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32,
}

impl Region {
	pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
		Self { x, y, width, height }
	}

	/// Number of pixels covered.
	pub fn area(&self) -> u64 {
		self.width as u64 * self.height as u64
	}

	/// Cuts the region down to what lies inside a `width` by `height` image.
	///
	/// Returns `None` if nothing is left.
	pub fn clamp_to(self, width: u32, height: u32) -> Option<Region> {
		if self.x >= width || self.y >= height {
			return None;
		}
		let clamped = Region {
			width: self.width.min(width - self.x),
			height: self.height.min(height - self.y),
			..self
		};
		if clamped.width == 0 || clamped.height == 0 {
			None
		} else {
			Some(clamped)
		}
	}

	/// Splits into top-left, top-right, bottom-left and bottom-right parts.
	///
	/// The first half of each dimension is rounded down and the second half
	/// takes the remainder, so the parts always tile the region exactly.
	/// Parts may be empty when a dimension is 1.
	pub fn quadrants(&self) -> [Region; 4] {
		let (w1, h1) = (self.width / 2, self.height / 2);
		let (w2, h2) = (self.width - w1, self.height - h1);
		[
			Region::new(self.x, self.y, w1, h1),
			Region::new(self.x + w1, self.y, w2, h1),
			Region::new(self.x, self.y + h1, w1, h2),
			Region::new(self.x + w1, self.y + h1, w2, h2),
		]
	}

	/// Iterates over the pixels of `source` inside the region, row by row.
	pub fn pixels<'a, S: PixelSource + ?Sized + 'a>(
		self,
		source: &'a S
	) -> impl Iterator<Item = Color> + 'a {
		(self.y..self.y + self.height).flat_map(move |row| {
			(self.x..self.x + self.width).map(move |col| source.pixel_at(col, row))
		})
	}
}

/// Node in a quadtree describing one block of an image.
///
/// A leaf (no sections) stands for its whole region painted in `color`.
/// A branch always has four section slots covering its region exactly;
/// a slot is only empty when its half of the region had no pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadtreeNode {
	pub region: Region,
	/// Average color of the region.
	pub color: Color,
	/// Score of the region under the metric used for building.
	pub error: f64,
	/// Distance from the root, which has depth 0.
	pub depth: u32,
	pub sections: Option<Box<[Option<QuadtreeNode>; 4]>>,
}

impl QuadtreeNode {
	pub fn is_leaf(&self) -> bool {
		self.sections.is_none()
	}

	/// Existing child nodes, in top-left, top-right, bottom-left,
	/// bottom-right order.
	pub fn children(&self) -> impl Iterator<Item = &QuadtreeNode> {
		self.sections.iter().flat_map(|s| s.iter().flatten())
	}

	/// Depth-first iterator over the leaves of this subtree.
	pub fn leaves(&self) -> Leaves<'_> {
		Leaves { stack: vec![self] }
	}
}

/// Iterator returned by `QuadtreeNode::leaves`.
pub struct Leaves<'a> {
	stack: Vec<&'a QuadtreeNode>,
}

impl<'a> Iterator for Leaves<'a> {
	type Item = &'a QuadtreeNode;

	fn next(&mut self) -> Option<Self::Item> {
		while let Some(node) = self.stack.pop() {
			match node.sections {
				None => return Some(node),
				Some(ref sects) => self.stack.extend(sects.iter().rev().flatten()),
			}
		}
		None
	}
}

/// Recursive decomposition of an image into a quadtree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Builder {
	/// Largest error a block may have and still become a leaf.
	pub threshold: f64,
	/// Blocks with a side this short or shorter are never split.
	pub min_block_size: u32,
	pub metric: ErrorMetric,
}

impl Builder {
	pub fn new(threshold: f64, min_block_size: u32, metric: ErrorMetric) -> Self {
		Self { threshold, min_block_size, metric }
	}

	/// Checks the parameters without building anything.
	pub fn validate(&self) -> Result<(), BuildError> {
		if self.min_block_size < 1 {
			return Err(BuildError::InvalidMinBlockSize);
		}
		if !self.threshold.is_finite() || self.threshold < 0. {
			return Err(BuildError::InvalidThreshold(self.threshold));
		}
		Ok(())
	}

	/// Builds the quadtree of the whole `source`.
	pub fn build<S: PixelSource + ?Sized>(&self, source: &S) -> Result<QuadtreeNode, BuildError> {
		self.build_with(source, None)
	}

	/// Builds the quadtree of the whole `source`, reporting progress to
	/// `sampler` if one is given.
	pub fn build_with<S: PixelSource + ?Sized>(
		&self,
		source: &S,
		mut sampler: Option<&mut FrameSampler>
	) -> Result<QuadtreeNode, BuildError> {
		self.validate()?;
		let (width, height) = (source.width(), source.height());
		let empty = BuildError::EmptyImage { width, height };
		if width == 0 || height == 0 {
			return Err(empty);
		}
		let root = self
			.build_region(source, Region::new(0, 0, width, height), 0, &mut sampler)?
			.ok_or(empty)?;
		if let Some(s) = sampler.as_deref_mut() {
			s.build_finished()?;
		}
		debug!(
			width,
			height,
			metric = %self.metric,
			threshold = self.threshold,
			min_block_size = self.min_block_size,
			leaves = root.leaf_count(),
			"built quadtree"
		);
		Ok(root)
	}

	fn build_region<S: PixelSource + ?Sized>(
		&self,
		source: &S,
		region: Region,
		depth: u32,
		sampler: &mut Option<&mut FrameSampler>
	) -> Result<Option<QuadtreeNode>, BuildError> {
		let region = match region.clamp_to(source.width(), source.height()) {
			Some(r) => r,
			None => return Ok(None),
		};
		let color = render::average_color(source, region);
		let error = self.metric.compute_error(source, region, color);

		let is_leaf = error <= self.threshold ||
			region.width <= self.min_block_size ||
			region.height <= self.min_block_size;
		if is_leaf {
			if let Some(s) = sampler.as_deref_mut() {
				s.leaf_finalized(region)?;
			}
			return Ok(Some(QuadtreeNode { region, color, error, depth, sections: None }));
		}

		// Recursion
		let mut sections: [Option<QuadtreeNode>; 4] = Default::default();
		for (slot, quadrant) in sections.iter_mut().zip(region.quadrants().iter()) {
			*slot = self.build_region(source, *quadrant, depth + 1, sampler)?;
			if let Some(s) = sampler.as_deref_mut() {
				s.child_finished()?;
			}
		}
		Ok(Some(QuadtreeNode {
			region,
			color,
			error,
			depth,
			sections: Some(Box::new(sections)),
		}))
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use ::image::{Rgb, RgbImage};

	/// Image of 1px black and white squares.
	pub(crate) fn checkerboard(width: u32, height: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, y| {
			if (x + y) % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
		})
	}

	/// Image whose pixel values change with position, so every block larger
	/// than a pixel has some error under every metric.
	pub(crate) fn gradient(width: u32, height: u32) -> RgbImage {
		RgbImage::from_fn(width, height, |x, y| {
			Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x * y) % 256) as u8])
		})
	}

	#[test]
	fn quadrants_tile_odd_regions() {
		let r = Region::new(3, 5, 7, 5);
		let q = r.quadrants();
		assert_eq!(q[0], Region::new(3, 5, 3, 2));
		assert_eq!(q[1], Region::new(6, 5, 4, 2));
		assert_eq!(q[2], Region::new(3, 7, 3, 3));
		assert_eq!(q[3], Region::new(6, 7, 4, 3));
		assert_eq!(q.iter().map(Region::area).sum::<u64>(), r.area());
	}

	#[test]
	fn clamp_drops_empty_regions() {
		assert_eq!(Region::new(4, 0, 2, 2).clamp_to(4, 4), None);
		assert_eq!(Region::new(0, 0, 0, 2).clamp_to(4, 4), None);
		assert_eq!(Region::new(2, 3, 5, 5).clamp_to(4, 4), Some(Region::new(2, 3, 2, 1)));
	}

	#[test]
	fn uniform_image_is_one_leaf_for_every_metric() {
		let img = RgbImage::from_pixel(4, 4, Rgb([40, 120, 200]));
		for &metric in ErrorMetric::ALL.iter() {
			let tree = Builder::new(0., 1, metric).build(&img).unwrap();
			assert!(tree.is_leaf(), "{} split a uniform image", metric);
			assert_eq!(tree.leaf_count(), 1);
			assert_eq!(tree.color, Rgb([40, 120, 200]));
		}
	}

	#[test]
	fn four_distinct_corners_split_to_pixels() {
		let mut img = RgbImage::new(2, 2);
		img.put_pixel(0, 0, Rgb([255, 0, 0]));
		img.put_pixel(1, 0, Rgb([0, 255, 0]));
		img.put_pixel(0, 1, Rgb([0, 0, 255]));
		img.put_pixel(1, 1, Rgb([255, 255, 255]));
		let tree = Builder::new(0., 1, ErrorMetric::Variance).build(&img).unwrap();
		assert_eq!(tree.leaf_count(), 4);
		let colors = tree.leaves().map(|l| l.color).collect::<Vec<_>>();
		assert_eq!(colors, vec![
			Rgb([255, 0, 0]),
			Rgb([0, 255, 0]),
			Rgb([0, 0, 255]),
			Rgb([255, 255, 255]),
		]);
		assert!(tree.leaves().all(|l| l.depth == 1));
	}

	#[test]
	fn leaves_tile_odd_sized_images() {
		for &(w, h) in [(1, 1), (1, 9), (7, 3), (13, 17), (33, 8)].iter() {
			let img = gradient(w, h);
			for &metric in ErrorMetric::ALL.iter() {
				let tree = Builder::new(0., 1, metric).build(&img).unwrap();
				assert_eq!(tree.verify_tiling(w, h), Ok(()), "{}x{} with {}", w, h, metric);
				assert_eq!(tree.leaves().map(|l| l.region.area()).sum::<u64>(), w as u64 * h as u64);
			}
		}
	}

	#[test]
	fn builds_are_deterministic() {
		let img = gradient(37, 21);
		let builder = Builder::new(150., 2, ErrorMetric::Variance);
		assert_eq!(builder.build(&img).unwrap(), builder.build(&img).unwrap());
	}

	#[test]
	fn min_block_size_is_respected() {
		let img = checkerboard(64, 64);
		for &min in [1, 2, 4, 8].iter() {
			let tree = Builder::new(0., min, ErrorMetric::Variance).build(&img).unwrap();
			assert!(tree.leaves().all(|l| l.region.width >= min && l.region.height >= min));
			assert!(tree.leaves().all(|l| l.region.width <= min || l.error == 0.));
		}
	}

	#[test]
	fn one_pixel_wide_images_are_leaves() {
		let img = gradient(1, 50);
		let tree = Builder::new(0., 1, ErrorMetric::Variance).build(&img).unwrap();
		assert!(tree.is_leaf());
		assert_eq!(tree.region, Region::new(0, 0, 1, 50));
	}

	#[test]
	fn rejects_bad_parameters() {
		let img = gradient(4, 4);
		assert!(matches!(
			Builder::new(1., 0, ErrorMetric::Variance).build(&img),
			Err(BuildError::InvalidMinBlockSize)
		));
		assert!(matches!(
			Builder::new(-1., 1, ErrorMetric::Variance).build(&img),
			Err(BuildError::InvalidThreshold(_))
		));
		assert!(matches!(
			Builder::new(f64::NAN, 1, ErrorMetric::Variance).build(&img),
			Err(BuildError::InvalidThreshold(_))
		));
		assert!(matches!(
			Builder::new(1., 1, ErrorMetric::Variance).build(&RgbImage::new(0, 3)),
			Err(BuildError::EmptyImage { width: 0, height: 3 })
		));
	}

	#[test]
	fn leaves_are_in_depth_first_order() {
		let img = checkerboard(4, 4);
		let tree = Builder::new(0., 1, ErrorMetric::Variance).build(&img).unwrap();
		let origins = tree.leaves().map(|l| (l.region.x, l.region.y)).take(5).collect::<Vec<_>>();
		assert_eq!(origins, vec![(0, 0), (1, 0), (0, 1), (1, 1), (2, 0)]);
	}
}

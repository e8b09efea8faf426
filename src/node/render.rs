use ::image::{Rgb, RgbImage};

use super::error::DrawError;
use super::{Color, PixelSource, Region};

/// Per-channel mean of the pixels in `region`, rounded down.
///
/// A region without pixels averages to black.
pub fn average_color<S: PixelSource + ?Sized>(source: &S, region: Region) -> Color {
	let count = region.area();
	if count == 0 {
		return Rgb([0, 0, 0]);
	}
	let sums = region.pixels(source).fold([0u64; 3], |mut s, p| {
		for c in 0..3 {
			s[c] += p.0[c] as u64;
		}
		s
	});
	Rgb([
		(sums[0] / count) as u8,
		(sums[1] / count) as u8,
		(sums[2] / count) as u8,
	])
}

impl super::QuadtreeNode {
	/// Renders the compressed image: every leaf painted in its average color.
	///
	/// The output has the size of this node's region, so calling this on the
	/// root gives an image as large as the source.
	pub fn to_image(&self) -> RgbImage {
		let mut img = RgbImage::new(self.region.width, self.region.height);
		let (dx, dy) = (self.region.x, self.region.y);
		for leaf in self.leaves() {
			let r = leaf.region;
			fill(&mut img, Region::new(r.x - dx, r.y - dy, r.width, r.height), leaf.color);
		}
		img
	}

	/// Paints every leaf of this subtree into `img` at its own coordinates.
	///
	/// Fails before drawing anything if a leaf doesn't fit in `img`.
	pub fn draw(&self, img: &mut RgbImage) -> Result<(), DrawError> {
		if let Some(leaf) = self.leaves().find(|l| !fits(l.region, img)) {
			let r = leaf.region;
			return Err(DrawError::OutOfBounds {
				x: r.x,
				y: r.y,
				width: r.width,
				height: r.height,
				buffer_width: img.width(),
				buffer_height: img.height(),
			});
		}
		for leaf in self.leaves() {
			fill(img, leaf.region, leaf.color);
		}
		Ok(())
	}
}

fn fits(region: Region, img: &RgbImage) -> bool {
	region.x as u64 + region.width as u64 <= img.width() as u64 &&
		region.y as u64 + region.height as u64 <= img.height() as u64
}

fn fill(img: &mut RgbImage, region: Region, color: Color) {
	for row in region.y..region.y + region.height {
		for col in region.x..region.x + region.width {
			img.put_pixel(col, row, color);
		}
	}
}

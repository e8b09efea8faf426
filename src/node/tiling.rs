use bitvec::order::Msb0;
use bitvec::vec::BitVec;

use super::error::TilingError;

/// One bit per pixel, row-major, set once a leaf covers the pixel.
type CoverageBitVec = BitVec<u8, Msb0>;

impl super::QuadtreeNode {
	/// Checks that the leaves of this tree cover every pixel of a
	/// `width` by `height` image exactly once.
	///
	/// Reports the first problem found: a leaf outside the image, a pixel
	/// covered twice, or (scanning row by row) a pixel never covered.
	pub fn verify_tiling(&self, width: u32, height: u32) -> Result<(), TilingError> {
		let mut covered = CoverageBitVec::repeat(false, width as usize * height as usize);
		for leaf in self.leaves() {
			let r = leaf.region;
			if r.x as u64 + r.width as u64 > width as u64 ||
				r.y as u64 + r.height as u64 > height as u64 {
				return Err(TilingError::OutOfBounds { x: r.x, y: r.y, width: r.width, height: r.height });
			}
			for row in r.y..r.y + r.height {
				let start = row as usize * width as usize + r.x as usize;
				let span = &mut covered[start..start + r.width as usize];
				if let Some(col) = span.first_one() {
					return Err(TilingError::Overlap { x: r.x + col as u32, y: row });
				}
				span.fill(true);
			}
		}
		match covered.first_zero() {
			Some(ind) => Err(TilingError::Gap {
				x: (ind % width as usize) as u32,
				y: (ind / width as usize) as u32,
			}),
			None => Ok(()),
		}
	}
}

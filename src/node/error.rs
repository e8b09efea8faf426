use thiserror::Error;

/// Reason why an image couldn't be turned into a quadtree.
#[derive(Debug, Error)]
pub enum BuildError {
	/// The minimum block size was zero.
	#[error("minimum block size must be at least 1")]
	InvalidMinBlockSize,
	/// The threshold was negative, infinite or NaN.
	#[error("threshold must be a finite non-negative number, got {0}")]
	InvalidThreshold(f64),
	/// The source has no pixels.
	#[error("image has no pixels ({width}x{height})")]
	EmptyImage { width: u32, height: u32 },
	/// A snapshot buffer could not be allocated while recording frames.
	#[error("ran out of memory after capturing {captured} frames; disable the animation, raise the minimum block size or threshold, or use a smaller input")]
	ResourceExhausted { captured: usize },
}

/// Reason why a target compression ratio couldn't be searched for.
#[derive(Debug, Error)]
pub enum TuneError {
	/// The requested ratio is outside `(0, 1]`.
	#[error("target compression ratio must be in (0, 1], got {0}")]
	InvalidRatio(f64),
	/// The tolerance was negative or not a number.
	#[error("tolerance must be a non-negative number, got {0}")]
	InvalidTolerance(f64),
	#[error(transparent)]
	Build(#[from] BuildError),
}

/// Reason why a quadtree couldn't be rendered to an image buffer.
#[derive(Debug, Error)]
pub enum DrawError {
	/// A leaf extends past the edge of the image buffer.
	#[error("leaf at ({x}, {y}) sized {width}x{height} does not fit in a {buffer_width}x{buffer_height} buffer")]
	OutOfBounds {
		x: u32,
		y: u32,
		width: u32,
		height: u32,
		buffer_width: u32,
		buffer_height: u32,
	},
}

/// Reason why the leaves of a quadtree don't tile an image exactly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TilingError {
	/// No leaf covers this pixel.
	#[error("pixel ({x}, {y}) is not covered by any leaf")]
	Gap { x: u32, y: u32 },
	/// More than one leaf covers this pixel.
	#[error("pixel ({x}, {y}) is covered by more than one leaf")]
	Overlap { x: u32, y: u32 },
	/// A leaf reaches outside the image.
	#[error("leaf at ({x}, {y}) sized {width}x{height} reaches outside the image")]
	OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
}

//! Writing the compressed image and the build animation to disk.
//!
//! Files are encoded in memory first and then moved into place, so a failed
//! run never leaves a partial file behind.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use ::image::buffer::ConvertBuffer;
use ::image::codecs::gif::{GifEncoder, Repeat};
use ::image::{Delay, Frame, ImageError, ImageFormat, RgbImage, RgbaImage};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extension used when an output path has none.
pub const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum OutputError {
	/// The extension doesn't name a format that can be written.
	#[error("unsupported output format for {path}: {source}")]
	Format { path: PathBuf, source: ImageError },
	#[error("failed to encode {path}: {source}")]
	Encode { path: PathBuf, source: ImageError },
	#[error("failed to write {path}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("no frames to write to {0}")]
	NoFrames(PathBuf),
}

/// `path`, with `DEFAULT_EXTENSION` added if it has no extension.
pub fn with_default_extension(path: &Path) -> PathBuf {
	if path.extension().is_some() {
		path.to_owned()
	} else {
		path.with_extension(DEFAULT_EXTENSION)
	}
}

/// `dir/stem_compressed.ext` for an input `dir/stem.ext`.
pub fn default_output_path(input: &Path) -> PathBuf {
	let ext = input.extension()
		.and_then(|e| e.to_str())
		.unwrap_or(DEFAULT_EXTENSION);
	sibling(input, &format!("_compressed.{}", ext))
}

/// `dir/stem_process.gif` for an input `dir/stem.ext`.
pub fn default_animation_path(input: &Path) -> PathBuf {
	sibling(input, "_process.gif")
}

fn sibling(input: &Path, suffix: &str) -> PathBuf {
	let stem = input.file_stem()
		.map(|s| s.to_string_lossy().into_owned())
		.unwrap_or_else(|| "output".to_owned());
	input.with_file_name(format!("{}{}", stem, suffix))
}

/// Encodes `img` in the format named by the extension of `path` (adding
/// `DEFAULT_EXTENSION` if missing) and writes it.
///
/// Returns the path written and its size in bytes.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<(PathBuf, u64), OutputError> {
	let path = with_default_extension(path);
	let format = ImageFormat::from_path(&path)
		.map_err(|source| OutputError::Format { path: path.clone(), source })?;
	let mut bytes = Cursor::new(Vec::new());
	img.write_to(&mut bytes, format)
		.map_err(|source| OutputError::Encode { path: path.clone(), source })?;
	let size = write_atomically(&path, bytes.get_ref())?;
	Ok((path, size))
}

/// Writes `frames` as an animated GIF showing each frame for `delay_ms`.
///
/// Returns the size of the file in bytes.
pub fn save_animation(
	frames: &[RgbImage],
	path: &Path,
	delay_ms: u32,
	looping: bool
) -> Result<u64, OutputError> {
	if frames.is_empty() {
		return Err(OutputError::NoFrames(path.to_owned()));
	}
	let encode_err = |source| OutputError::Encode { path: path.to_owned(), source };
	let mut bytes = Vec::new();
	{
		let mut encoder = GifEncoder::new(&mut bytes);
		encoder.set_repeat(if looping { Repeat::Infinite } else { Repeat::Finite(0) })
			.map_err(encode_err)?;
		let delay = Delay::from_numer_denom_ms(delay_ms, 1);
		encoder.encode_frames(frames.iter().map(|f| {
			let rgba: RgbaImage = f.convert();
			Frame::from_parts(rgba, 0, 0, delay)
		})).map_err(encode_err)?;
	}
	write_atomically(path, &bytes)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<u64, OutputError> {
	let io_err = |source| OutputError::Io { path: path.to_owned(), source };
	let dir = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p,
		_ => Path::new("."),
	};
	let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
	tmp.write_all(bytes).map_err(io_err)?;
	tmp.persist(path).map_err(|e| io_err(e.error))?;
	Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ::image::Rgb;

	#[test]
	fn default_extension_is_jpg() {
		assert_eq!(with_default_extension(Path::new("a/b")), PathBuf::from("a/b.jpg"));
		assert_eq!(with_default_extension(Path::new("a/b.png")), PathBuf::from("a/b.png"));
	}

	#[test]
	fn default_paths() {
		assert_eq!(default_output_path(Path::new("x/y.bmp")), PathBuf::from("x/y_compressed.bmp"));
		assert_eq!(default_output_path(Path::new("y")), PathBuf::from("y_compressed.jpg"));
		assert_eq!(default_animation_path(Path::new("x/y.bmp")), PathBuf::from("x/y_process.gif"));
	}

	#[test]
	fn saves_and_reloads_png() {
		let dir = tempfile::tempdir().unwrap();
		let img = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 7]));
		let (path, size) = save_image(&img, &dir.path().join("out.png")).unwrap();
		assert_eq!(size, std::fs::metadata(&path).unwrap().len());
		assert_eq!(::image::open(&path).unwrap().to_rgb8(), img);
	}

	#[test]
	fn extensionless_paths_become_jpeg() {
		let dir = tempfile::tempdir().unwrap();
		let img = RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]));
		let (path, _) = save_image(&img, &dir.path().join("out")).unwrap();
		assert_eq!(path, dir.path().join("out.jpg"));
		assert_eq!(::image::open(&path).unwrap().to_rgb8().dimensions(), (8, 8));
	}

	#[test]
	fn unknown_format_writes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let img = RgbImage::new(2, 2);
		let err = save_image(&img, &dir.path().join("out.qqq")).unwrap_err();
		assert!(matches!(err, OutputError::Format { .. }));
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}

	#[test]
	fn writes_an_animated_gif() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("steps.gif");
		let frames = vec![
			RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])),
			RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])),
		];
		let size = save_animation(&frames, &path, 100, true).unwrap();
		assert!(size > 0);
		let bytes = std::fs::read(&path).unwrap();
		assert_eq!(&bytes[..6], b"GIF89a");
		// Netscape looping extension
		assert!(bytes.windows(11).any(|w| w == b"NETSCAPE2.0"));
	}

	#[test]
	fn refuses_empty_animation() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("steps.gif");
		assert!(matches!(save_animation(&[], &path, 100, true), Err(OutputError::NoFrames(_))));
		assert!(!path.exists());
	}
}

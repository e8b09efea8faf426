use image::error::ImageError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quadtree_compress::output;
use quadtree_compress::{compress, BuildError, CompressConfig, ConfigError, Error, ErrorMetric};

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Helper function for `main`.
fn error_exit(msg: &str, code: i32) -> ! {
	eprintln!("{}", msg);
	std::process::exit(code)
}

/// Parses the value of option `name`, if given, or exits with status 2.
fn parse_value<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Option<T> {
	matches.value_of(name).map(|v| match v.parse() {
		Ok(n) => n,
		Err(_) => error_exit(&format!("Invalid value for {}: {:?}", name, v), 2)
	})
}

/// `clap`-based CLI for compressing images.
///
/// May exit process with status code if there are errors:
///
/// 1: `clap` error
///
/// 2: invalid arguments or configuration
///
/// 3: file I/O issues
///
/// 4: invalid image data
///
/// 5: computation limits exceeded
///
/// 10: other, potentially unknown error
fn main() {
	let clap_matches = clap::App::new("quadtree_compress")
		.version(env!("CARGO_PKG_VERSION"))
		.author("vkcz")
		.about("Compresses an image by painting uniform quadtree blocks in their average color.")
		.arg_from_usage("-c, --config=[FILE] 'TOML file with settings; other options override it'")
		.arg_from_usage("-m, --method=[METHOD] 'Block error metric: variance, mad, max-channel-range, entropy or ssim (or 1-5); defaults to variance'")
		.arg_from_usage("-t, --threshold=[N] 'Largest block error painted as one color; defaults to 10'")
		.arg_from_usage("-b, --min-block=[N] 'Blocks with a side this short or shorter are never split; defaults to 4'")
		.arg_from_usage("-r, --target=[R] 'Target compression ratio from 0 to 1, searched for by adjusting the threshold; defaults to 0 (off)'")
		.arg_from_usage("-g, --gif=[FILE] 'Path for the animation of the decomposition; defaults to INPUT with _process.gif'")
		.arg_from_usage("--no-gif 'Do not record an animation'")
		.arg_from_usage("--delay=[MS] 'Milliseconds per animation frame; defaults to 500'")
		.arg_from_usage("--max-frames=[N] 'Most animation frames to keep; defaults to 100'")
		.arg_from_usage("--frame-skip=[N] 'Only consider every Nth animation frame; defaults to 1'")
		.arg_from_usage("--seed=[N] 'Seed for spreading animation frames over the build; defaults to 0'")
		.arg_from_usage("-v, --verbose 'Log each step of the threshold search'")
		.arg_from_usage("<INPUT> 'Path to input image'")
		.arg_from_usage("[OUTPUT] 'Path to output image; defaults to INPUT with _compressed added to the name'")
		.get_matches();

	let mut config = match clap_matches.value_of("config") {
		Some(path) => match CompressConfig::load(Path::new(path)) {
			Ok(c) => c,
			Err(e @ ConfigError::ReadFile(..)) => error_exit(&e.to_string(), 3),
			Err(e) => error_exit(&e.to_string(), 2),
		},
		None => CompressConfig::default(),
	};
	// `INPUT` is required, so clap has already exited if it is missing
	config.input_path = clap_matches.value_of("INPUT").map(PathBuf::from).unwrap_or_default();
	if let Some(p) = clap_matches.value_of("OUTPUT") {
		config.output_path = Some(PathBuf::from(p));
	}
	if let Some(p) = clap_matches.value_of("gif") {
		config.animation_output_path = Some(PathBuf::from(p));
	}
	if let Some(m) = clap_matches.value_of("method") {
		config.error_method = match m.parse::<ErrorMetric>() {
			Ok(m) => m,
			Err(e) => error_exit(&e.to_string(), 2)
		};
	}
	if clap_matches.is_present("no-gif") {
		config.create_animation = false;
	}
	config.threshold = parse_value(&clap_matches, "threshold").unwrap_or(config.threshold);
	config.min_block_size = parse_value(&clap_matches, "min-block").unwrap_or(config.min_block_size);
	config.target_compression = parse_value(&clap_matches, "target").unwrap_or(config.target_compression);
	config.animation_delay_ms = parse_value(&clap_matches, "delay").unwrap_or(config.animation_delay_ms);
	config.max_frames = parse_value(&clap_matches, "max-frames").unwrap_or(config.max_frames);
	config.frame_skip = parse_value(&clap_matches, "frame-skip").unwrap_or(config.frame_skip);
	config.frame_seed = parse_value(&clap_matches, "seed").unwrap_or(config.frame_seed);
	if clap_matches.is_present("verbose") {
		config.logging.level = "debug".into();
	}

	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
		)
		.init();

	if let Err(e) = config.validate() {
		error_exit(&e.to_string(), 2);
	}

	let started = Instant::now();
	let source = match image::open(&config.input_path) {
		Ok(i) => i,
		Err(e) => {
			error!(path = %config.input_path.display(), error = %e, "failed to read input");
			let (msg, code) = match e {
				ImageError::Decoding(_) => ("Invalid image data", 4),
				ImageError::Unsupported(_) => ("Unsupported image format", 4),
				ImageError::Limits(_) => ("Computation limits exceeded", 5),
				ImageError::IoError(_) => ("File not found or could not be read", 3),
				_ => ("An error occurred", 10)
			};
			error_exit(msg, code)
		}
	}.to_rgb8();
	info!(
		path = %config.input_path.display(),
		width = source.width(),
		height = source.height(),
		metric = %config.error_method,
		"compressing"
	);

	let result = match compress(&source, &config) {
		Ok(r) => r,
		Err(e) => {
			let code = match e {
				Error::Build(BuildError::ResourceExhausted { .. }) => 5,
				Error::Config(_) | Error::Build(_) | Error::Tune(_) => 2,
			};
			error_exit(&e.to_string(), code)
		}
	};
	let compressed = result.to_image();
	let elapsed = started.elapsed();

	let mut write_failed = false;
	let output_path = config.resolved_output_path();
	let output_size = match output::save_image(&compressed, &output_path) {
		Ok((path, size)) => {
			info!(path = %path.display(), bytes = size, "wrote compressed image");
			Some(size)
		},
		Err(e) => {
			error!(error = %e, "failed to write compressed image");
			write_failed = true;
			None
		}
	};
	let input_size = std::fs::metadata(&config.input_path).map(|m| m.len()).ok();

	println!();
	println!("===== Compression results =====");
	println!("Execution time     : {:.3} s", elapsed.as_secs_f64());
	match input_size {
		Some(n) => println!("Input size         : {} bytes", n),
		None => println!("Input size         : unknown"),
	}
	match output_size {
		Some(n) => println!("Output size        : {} bytes", n),
		None => println!("Output size        : not written"),
	}
	if let (Some(before), Some(after)) = (input_size, output_size) {
		if before > 0 {
			println!("Size reduction     : {:.2}%", (1. - after as f64 / before as f64) * 100.);
		}
	}
	println!("Tree depth         : {}", result.max_depth);
	println!("Leaf count         : {}", result.leaf_count);
	println!("Block ratio        : {:.4}", result.root.compression_ratio());
	match result.tuning {
		Some(t) => println!(
			"Threshold          : {} (target {}, {})",
			t.threshold,
			config.target_compression,
			if t.converged { "reached" } else { "closest found" }
		),
		None => println!("Threshold          : {}", result.threshold),
	}

	if config.create_animation {
		if result.frames.is_empty() {
			info!("no animation frames were recorded");
		} else {
			let gif_path = config.resolved_animation_path();
			match output::save_animation(&result.frames, &gif_path, config.animation_delay_ms, true) {
				Ok(size) => println!(
					"Animation          : {} ({} frames, {} bytes)",
					gif_path.display(),
					result.frames.len(),
					size
				),
				Err(e) => {
					error!(error = %e, "failed to write animation");
					write_failed = true;
				}
			}
		}
	}

	if write_failed {
		std::process::exit(3);
	}
}

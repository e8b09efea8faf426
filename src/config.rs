use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::node::frames::SamplerConfig;
use crate::node::metric::ErrorMetric;
use crate::output;

/// Everything a compression run needs, as read from a TOML file and/or the
/// command line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressConfig {
	#[serde(default)]
	pub input_path: PathBuf,
	/// Defaults to the input path with `_compressed` added to the stem.
	#[serde(default)]
	pub output_path: Option<PathBuf>,
	/// Defaults to the input path with `_process.gif` replacing the extension.
	#[serde(default)]
	pub animation_output_path: Option<PathBuf>,
	#[serde(default = "default_error_method")]
	pub error_method: ErrorMetric,
	#[serde(default = "default_threshold")]
	pub threshold: f64,
	#[serde(default = "default_min_block_size")]
	pub min_block_size: u32,
	/// Wanted compression ratio in `[0, 1]`; 0 uses `threshold` as is.
	#[serde(default)]
	pub target_compression: f64,
	#[serde(default = "default_create_animation")]
	pub create_animation: bool,
	#[serde(default = "default_animation_delay_ms")]
	pub animation_delay_ms: u32,
	#[serde(default = "default_max_frames")]
	pub max_frames: usize,
	#[serde(default = "default_frame_skip")]
	pub frame_skip: usize,
	#[serde(default)]
	pub frame_seed: u64,
	#[serde(default)]
	pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
	#[serde(default = "default_log_level")]
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_log_level(),
		}
	}
}

impl Default for CompressConfig {
	fn default() -> Self {
		Self {
			input_path: PathBuf::new(),
			output_path: None,
			animation_output_path: None,
			error_method: default_error_method(),
			threshold: default_threshold(),
			min_block_size: default_min_block_size(),
			target_compression: 0.,
			create_animation: default_create_animation(),
			animation_delay_ms: default_animation_delay_ms(),
			max_frames: default_max_frames(),
			frame_skip: default_frame_skip(),
			frame_seed: 0,
			logging: LoggingConfig::default(),
		}
	}
}

impl CompressConfig {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self, ConfigError> {
		toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
	}

	/// Checks the values that would otherwise only fail once a build starts.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.min_block_size < 1 {
			return Err(ConfigError::invalid("min_block_size", "must be at least 1"));
		}
		if !self.threshold.is_finite() || self.threshold < 0. {
			return Err(ConfigError::invalid("threshold", "must be a finite non-negative number"));
		}
		if !(0. ..=1.).contains(&self.target_compression) {
			return Err(ConfigError::invalid("target_compression", "must be between 0 and 1"));
		}
		if self.frame_skip < 1 {
			return Err(ConfigError::invalid("frame_skip", "must be at least 1"));
		}
		Ok(())
	}

	/// Whether a target ratio replaces the fixed threshold.
	pub fn tuning_enabled(&self) -> bool {
		self.target_compression > 0.
	}

	pub fn sampler(&self) -> SamplerConfig {
		SamplerConfig {
			max_frames: self.max_frames,
			frame_skip: self.frame_skip,
			seed: self.frame_seed,
		}
	}

	pub fn resolved_output_path(&self) -> PathBuf {
		match &self.output_path {
			Some(p) => output::with_default_extension(p),
			None => output::default_output_path(&self.input_path),
		}
	}

	pub fn resolved_animation_path(&self) -> PathBuf {
		self.animation_output_path
			.clone()
			.unwrap_or_else(|| output::default_animation_path(&self.input_path))
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {0}: {1}")]
	ReadFile(String, std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(String),
	#[error("invalid {field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}

impl ConfigError {
	fn invalid(field: &'static str, reason: &str) -> Self {
		ConfigError::Invalid { field, reason: reason.to_owned() }
	}
}

// Default value functions
fn default_error_method() -> ErrorMetric {
	ErrorMetric::Variance
}
fn default_threshold() -> f64 {
	10.0
}
fn default_min_block_size() -> u32 {
	4
}
fn default_create_animation() -> bool {
	true
}
fn default_animation_delay_ms() -> u32 {
	500
}
fn default_max_frames() -> usize {
	100
}
fn default_frame_skip() -> usize {
	1
}
fn default_log_level() -> String {
	"info".into()
}

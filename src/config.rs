//! Application configuration and constants

use std::path::PathBuf;

use crate::runtime::{Device, Precision};

// === Generation Defaults ===
pub const DEFAULT_MAX_LENGTH: usize = 512;
pub const DEFAULT_NUM_BEAMS: usize = 3;
pub const DEFAULT_OFFLOAD: bool = true;

// === Environment ===
pub const ENV_CACHE_DIR: &str = "SEER_CACHE_DIR";
pub const ENV_MAX_LENGTH: &str = "SEER_MAX_LENGTH";
pub const ENV_NUM_BEAMS: &str = "SEER_NUM_BEAMS";
pub const ENV_OFFLOAD: &str = "SEER_OFFLOAD";

// === Artifacts ===
pub const ONNX_DIR: &str = "onnx";
pub const QUANTIZED_SUFFIX: &str = "_quantized";
pub const TOKENIZER: &str = "tokenizer.json";
pub const MODEL_CONFIG: &str = "config.json";
pub const PREPROCESSOR_CONFIG: &str = "preprocessor_config.json";
pub const GENERATION_CONFIG: &str = "generation_config.json";

// === Prompts ===
pub const DEFAULT_TASK: &str = "<MORE_DETAILED_CAPTION>";
pub const DEFAULT_QUESTION: &str = "Describe the image.";

/// Settings read by the interrogator and the adapters
#[derive(Debug, Clone)]
pub struct Options {
	/// Where downloaded model artifacts live (`None` = hub default)
	pub cache_dir: Option<PathBuf>,
	/// Maximum number of generated tokens for task-prompt models
	pub max_length: usize,
	/// Beam width for task-prompt models
	pub num_beams: usize,
	/// Move the resident model to CPU after each call
	pub offload: bool,
	/// Device the model is placed on before inference
	pub device: Device,
	/// Which ONNX variant to fetch
	pub precision: Precision,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			cache_dir: None,
			max_length: DEFAULT_MAX_LENGTH,
			num_beams: DEFAULT_NUM_BEAMS,
			offload: DEFAULT_OFFLOAD,
			device: Device::Accelerator,
			precision: Precision::Full,
		}
	}
}

impl Options {
	/// Defaults overridden by `SEER_*` environment variables
	pub fn from_env() -> Self {
		let mut options = Self::default();

		if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
			crate::ui::debug(&format!("Using {}: {}", ENV_CACHE_DIR, dir));
			options.cache_dir = Some(PathBuf::from(dir));
		}
		if let Some(n) = env_parse::<usize>(ENV_MAX_LENGTH) {
			options.max_length = n;
		}
		if let Some(n) = env_parse::<usize>(ENV_NUM_BEAMS) {
			options.num_beams = n;
		}
		if let Ok(flag) = std::env::var(ENV_OFFLOAD) {
			options.offload = parse_flag(&flag).unwrap_or(DEFAULT_OFFLOAD);
		}

		options.sanitized()
	}

	/// Clamp values that would make generation meaningless
	pub fn sanitized(mut self) -> Self {
		self.max_length = self.max_length.max(1);
		self.num_beams = self.num_beams.max(1);
		self
	}
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
	let raw = std::env::var(key).ok()?;
	match raw.trim().parse() {
		Ok(v) => Some(v),
		Err(_) => {
			crate::ui::warn(&format!("Ignoring invalid {}={}", key, raw));
			None
		}
	}
}

fn parse_flag(raw: &str) -> Option<bool> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_constants() {
		let options = Options::default();
		assert_eq!(options.max_length, DEFAULT_MAX_LENGTH);
		assert_eq!(options.num_beams, DEFAULT_NUM_BEAMS);
		assert!(options.offload);
		assert!(options.cache_dir.is_none());
	}

	#[test]
	fn sanitized_clamps_zero() {
		let options = Options {
			max_length: 0,
			num_beams: 0,
			..Options::default()
		}
		.sanitized();
		assert_eq!(options.max_length, 1);
		assert_eq!(options.num_beams, 1);
	}

	#[test]
	fn flags_parse() {
		assert_eq!(parse_flag("ON"), Some(true));
		assert_eq!(parse_flag(" 0 "), Some(false));
		assert_eq!(parse_flag("maybe"), None);
	}
}

//! Image and text preprocessing shared by the adapters

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;
use tokenizers::Tokenizer;

pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
pub const HALF: [f32; 3] = [0.5, 0.5, 0.5];

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SizeConfig {
	HeightWidth { height: u32, width: u32 },
	ShortestEdge { shortest_edge: u32 },
}

/// Fields of `preprocessor_config.json` this crate understands
#[derive(Debug, Clone, Default, Deserialize)]
struct PreprocessorConfig {
	image_mean: Option<[f32; 3]>,
	image_std: Option<[f32; 3]>,
	size: Option<SizeConfig>,
	do_normalize: Option<bool>,
	rescale_factor: Option<f32>,
}

/// Resize, rescale and normalize images into NCHW pixel tensors
#[derive(Debug, Clone)]
pub struct ImageProcessor {
	width: u32,
	height: u32,
	mean: [f32; 3],
	std: [f32; 3],
	rescale: f32,
	normalize: bool,
}

impl ImageProcessor {
	pub fn new(size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
		Self {
			width: size,
			height: size,
			mean,
			std,
			rescale: 1.0 / 255.0,
			normalize: true,
		}
	}

	/// Apply a `preprocessor_config.json` on top of family defaults
	pub fn load(path: Option<&Path>, defaults: Self) -> Result<Self> {
		let Some(path) = path else {
			return Ok(defaults);
		};
		let raw = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read {}", path.display()))?;
		let config: PreprocessorConfig = serde_json::from_str(&raw)
			.with_context(|| format!("Failed to parse {}", path.display()))?;
		Ok(defaults.with_config(config))
	}

	fn with_config(mut self, config: PreprocessorConfig) -> Self {
		if let Some(mean) = config.image_mean {
			self.mean = mean;
		}
		if let Some(std) = config.image_std {
			self.std = std;
		}
		match config.size {
			Some(SizeConfig::HeightWidth { height, width }) => {
				self.height = height;
				self.width = width;
			}
			Some(SizeConfig::ShortestEdge { shortest_edge }) => {
				self.height = shortest_edge;
				self.width = shortest_edge;
			}
			None => {}
		}
		if let Some(normalize) = config.do_normalize {
			self.normalize = normalize;
		}
		if let Some(rescale) = config.rescale_factor {
			self.rescale = rescale;
		}
		self
	}

	/// (width, height) of the produced tensor
	pub fn size(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	/// `[1, 3, height, width]` tensor
	pub fn preprocess(&self, img: &DynamicImage) -> Array4<f32> {
		let resized = img.resize_exact(self.width, self.height, FilterType::CatmullRom);
		let rgb = resized.to_rgb8();
		let (w, h) = (self.width as usize, self.height as usize);

		let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
		for (x, y, px) in rgb.enumerate_pixels() {
			for c in 0..3 {
				let mut v = px[c] as f32 * self.rescale;
				if self.normalize {
					v = (v - self.mean[c]) / self.std[c];
				}
				tensor[[0, c, y as usize, x as usize]] = v;
			}
		}
		tensor
	}
}

/// Thin wrapper over a `tokenizers` tokenizer
pub struct TextProcessor {
	tokenizer: Tokenizer,
}

impl TextProcessor {
	pub fn load(path: &Path) -> Result<Self> {
		let tokenizer = Tokenizer::from_file(path)
			.map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
		Ok(Self { tokenizer })
	}

	pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
		Self { tokenizer }
	}

	pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
		let encoding = self
			.tokenizer
			.encode(text, add_special_tokens)
			.map_err(|e| anyhow!("Tokenization failed: {}", e))?;
		Ok(encoding.get_ids().to_vec())
	}

	pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
		self.tokenizer
			.decode(ids, skip_special_tokens)
			.map_err(|e| anyhow!("Decoding failed: {}", e))
	}

	pub fn token_id(&self, token: &str) -> Option<u32> {
		self.tokenizer.token_to_id(token)
	}

	/// Id of the first candidate token the vocabulary knows
	pub fn first_id(&self, candidates: &[&str]) -> Result<u32> {
		candidates
			.iter()
			.find_map(|t| self.token_id(t))
			.with_context(|| format!("Tokenizer has none of {:?}", candidates))
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use image::{Rgb, RgbImage};
	use std::str::FromStr;

	pub(crate) fn fixture_tokenizer() -> TextProcessor {
		let json = include_str!("../../tests/fixtures/tokenizer.json");
		TextProcessor::from_tokenizer(Tokenizer::from_str(json).unwrap())
	}

	#[test]
	fn preprocess_shapes_and_normalizes() {
		let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 3, Rgb([255, 0, 128])));
		let processor = ImageProcessor::new(4, HALF, HALF);
		let tensor = processor.preprocess(&img);

		assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
		assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
		assert!((tensor[[0, 1, 2, 3]] + 1.0).abs() < 1e-5);
	}

	#[test]
	fn config_overrides_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("preprocessor_config.json");
		std::fs::write(
			&path,
			r#"{"image_mean":[0.1,0.2,0.3],"size":{"height":8,"width":16},"do_normalize":false}"#,
		)
		.unwrap();

		let processor = ImageProcessor::load(Some(&path), ImageProcessor::new(224, CLIP_MEAN, CLIP_STD)).unwrap();
		assert_eq!(processor.size(), (16, 8));
		assert_eq!(processor.mean, [0.1, 0.2, 0.3]);
		assert_eq!(processor.std, CLIP_STD);
		assert!(!processor.normalize);
	}

	#[test]
	fn shortest_edge_gives_square() {
		let processor = ImageProcessor::new(224, CLIP_MEAN, CLIP_STD).with_config(PreprocessorConfig {
			size: Some(SizeConfig::ShortestEdge { shortest_edge: 384 }),
			..PreprocessorConfig::default()
		});
		assert_eq!(processor.size(), (384, 384));
	}

	#[test]
	fn tokenizer_round_trip_skips_specials() {
		let text = fixture_tokenizer();
		let ids = text.encode("what is this ?", true).unwrap();
		assert_eq!(ids, vec![0, 6, 7, 8, 9, 1]);
		assert_eq!(text.decode(&ids, true).unwrap(), "what is this ?");
		assert_eq!(text.first_id(&["<s>", "[CLS]"]).unwrap(), 0);
		assert!(text.first_id(&["<s>"]).is_err());
	}
}

//! BLIP question answering: image encoder, question encoder and answer decoder

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Deserialize;
use std::path::Path;

use crate::config::{self, Options};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::{generate, GenerationConfig};
use super::processor::{ImageProcessor, TextProcessor, CLIP_MEAN, CLIP_STD};
use super::session::{array_tensor, extract, filled_tensor, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["vision_model", "text_encoder", "text_decoder"];
pub const FILES: &[&str] = &[config::TOKENIZER, config::MODEL_CONFIG, config::PREPROCESSOR_CONFIG];
pub const OPTIONAL: &[&str] = &[config::MODEL_CONFIG, config::PREPROCESSOR_CONFIG];

const IMAGE_SIZE: u32 = 384;
const MAX_NEW_TOKENS: usize = 20;
/// `[DEC]`, appended after the BERT vocabulary
const DEFAULT_BOS: u32 = 30522;

#[derive(Debug, Default, Deserialize)]
struct TextConfig {
	bos_token_id: Option<u32>,
	sep_token_id: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
	#[serde(default)]
	text_config: TextConfig,
}

fn read_config(path: Option<&Path>) -> Result<ModelConfig> {
	let Some(path) = path else {
		return Ok(ModelConfig::default());
	};
	let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
	serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub struct Blip {
	vision: Graph,
	encoder: Graph,
	decoder: Graph,
	image: ImageProcessor,
	text: TextProcessor,
	bos: u32,
	eos: u32,
}

impl Blip {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let vision = Graph::load(artifacts, &spec.graph("vision_model"), spec.device)
			.context("Failed to load BLIP vision model")?;
		let encoder = Graph::load(artifacts, &spec.graph("text_encoder"), spec.device)
			.context("Failed to load BLIP text encoder")?;
		let decoder = Graph::load(artifacts, &spec.graph("text_decoder"), spec.device)
			.context("Failed to load BLIP text decoder")?;

		let image = ImageProcessor::load(
			artifacts.optional(config::PREPROCESSOR_CONFIG),
			ImageProcessor::new(IMAGE_SIZE, CLIP_MEAN, CLIP_STD),
		)?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;

		let model_config = read_config(artifacts.optional(config::MODEL_CONFIG))?;
		let bos = model_config
			.text_config
			.bos_token_id
			.or_else(|| text.token_id("[DEC]"))
			.unwrap_or(DEFAULT_BOS);
		let eos = match model_config.text_config.sep_token_id {
			Some(id) => id,
			None => text.first_id(&["[SEP]"])?,
		};

		Ok(Self { vision, encoder, decoder, image, text, bos, eos })
	}
}

impl VisionLanguageModel for Blip {
	fn family(&self) -> Family {
		Family::Blip
	}

	fn device(&self) -> Device {
		self.vision.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(&mut [&mut self.vision, &mut self.encoder, &mut self.decoder], device)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, _options: &Options) -> Result<String> {
		let pixels = array_tensor(&self.image.preprocess(image))?;
		let image_embeds = {
			let outputs = self.vision.session().run(ort::inputs!["pixel_values" => pixels])?;
			extract(&outputs, "last_hidden_state")?
		};
		let image_len = image_embeds.shape().get(1).copied().unwrap_or(0);

		let question_ids = self.text.encode(question, true)?;
		let question_embeds = {
			let outputs = self.encoder.session().run(ort::inputs![
				"input_ids" => ids_tensor(&question_ids)?,
				"attention_mask" => filled_tensor(question_ids.len(), 1)?,
				"encoder_hidden_states" => array_tensor(&image_embeds)?,
				"encoder_attention_mask" => filled_tensor(image_len, 1)?
			])?;
			extract(&outputs, "last_hidden_state")?
		};

		let generation = GenerationConfig::greedy(MAX_NEW_TOKENS, self.eos);
		let decoder = &mut self.decoder;
		let tokens = generate(vec![self.bos], &generation, |tokens| {
			let outputs = decoder.session().run(ort::inputs![
				"input_ids" => ids_tensor(tokens)?,
				"encoder_hidden_states" => array_tensor(&question_embeds)?,
				"encoder_attention_mask" => filled_tensor(question_ids.len(), 1)?
			])?;
			last_logits(&outputs, "logits")
		})?;

		self.text.decode(&tokens, true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_text_config_tokens() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"text_config":{"bos_token_id":30522,"sep_token_id":102}}"#).unwrap();

		let config = read_config(Some(&path)).unwrap();
		assert_eq!(config.text_config.bos_token_id, Some(30522));
		assert_eq!(config.text_config.sep_token_id, Some(102));
	}

	#[test]
	fn missing_config_uses_defaults() {
		let config = read_config(None).unwrap();
		assert!(config.text_config.bos_token_id.is_none());
	}
}

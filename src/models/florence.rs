//! Florence-2: task-prompted encoder-decoder.
//!
//! Image features and the embedded task prompt are concatenated and encoded
//! once; the decoder then runs a beam search over token embeddings. The raw
//! generation keeps its special tokens so region tasks can be parsed.

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::ArrayD;
use serde::Deserialize;
use std::path::Path;

use crate::config::{self, Options};
use crate::core::task::{extract_answer, extract_task, post_process, prompt_for};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::{generate, GenerationConfig};
use super::processor::{ImageProcessor, TextProcessor, IMAGENET_MEAN, IMAGENET_STD};
use super::session::{array_tensor, concat_seq, extract, filled_tensor, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["vision_encoder", "embed_tokens", "encoder_model", "decoder_model"];
pub const FILES: &[&str] = &[
	config::TOKENIZER,
	config::PREPROCESSOR_CONFIG,
	config::GENERATION_CONFIG,
];
pub const OPTIONAL: &[&str] = &[config::PREPROCESSOR_CONFIG, config::GENERATION_CONFIG];

const IMAGE_SIZE: u32 = 768;

/// Decoding constants from `generation_config.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct GenerationDefaults {
	decoder_start_token_id: u32,
	forced_bos_token_id: Option<u32>,
	eos_token_id: u32,
	no_repeat_ngram_size: usize,
}

impl Default for GenerationDefaults {
	fn default() -> Self {
		Self {
			decoder_start_token_id: 2,
			forced_bos_token_id: Some(0),
			eos_token_id: 2,
			no_repeat_ngram_size: 3,
		}
	}
}

impl GenerationDefaults {
	fn read(path: Option<&Path>) -> Result<Self> {
		let Some(path) = path else {
			return Ok(Self::default());
		};
		let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
		serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
	}

	/// Decoder start token followed by the forced beginning-of-sequence token
	fn prefix(&self) -> Vec<u32> {
		let mut ids = vec![self.decoder_start_token_id];
		ids.extend(self.forced_bos_token_id);
		ids
	}

	fn config(&self, options: &Options) -> GenerationConfig {
		GenerationConfig {
			max_new_tokens: options.max_length,
			num_beams: options.num_beams,
			eos_token_id: self.eos_token_id,
			no_repeat_ngram_size: self.no_repeat_ngram_size,
		}
	}
}

pub struct Florence {
	vision: Graph,
	embed: Graph,
	encoder: Graph,
	decoder: Graph,
	image: ImageProcessor,
	text: TextProcessor,
	defaults: GenerationDefaults,
}

impl Florence {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let vision = Graph::load(artifacts, &spec.graph("vision_encoder"), spec.device)
			.context("Failed to load Florence vision encoder")?;
		let embed = Graph::load(artifacts, &spec.graph("embed_tokens"), spec.device)
			.context("Failed to load Florence token embeddings")?;
		let encoder = Graph::load(artifacts, &spec.graph("encoder_model"), spec.device)
			.context("Failed to load Florence encoder")?;
		let decoder = Graph::load(artifacts, &spec.graph("decoder_model"), spec.device)
			.context("Failed to load Florence decoder")?;

		let image = ImageProcessor::load(
			artifacts.optional(config::PREPROCESSOR_CONFIG),
			ImageProcessor::new(IMAGE_SIZE, IMAGENET_MEAN, IMAGENET_STD),
		)?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;
		let defaults = GenerationDefaults::read(artifacts.optional(config::GENERATION_CONFIG))?;

		Ok(Self { vision, embed, encoder, decoder, image, text, defaults })
	}

	fn encode(&mut self, prompt: &str, image: &DynamicImage) -> Result<ArrayD<f32>> {
		let pixels = array_tensor(&self.image.preprocess(image))?;
		let features = {
			let outputs = self.vision.session().run(ort::inputs!["pixel_values" => pixels])?;
			extract(&outputs, "image_features")?
		};

		let prompt_ids = self.text.encode(prompt, true)?;
		let prompt_embeds = embed_tokens(&mut self.embed, &prompt_ids)?;
		let inputs = concat_seq(&[&features, &prompt_embeds])?;
		let seq = inputs.shape()[1];

		let outputs = self.encoder.session().run(ort::inputs![
			"inputs_embeds" => array_tensor(&inputs)?,
			"attention_mask" => filled_tensor(seq, 1)?
		])?;
		extract(&outputs, "last_hidden_state")
	}
}

fn embed_tokens(embed: &mut Graph, ids: &[u32]) -> Result<ArrayD<f32>> {
	let outputs = embed.session().run(ort::inputs!["input_ids" => ids_tensor(ids)?])?;
	extract(&outputs, "inputs_embeds")
}

impl VisionLanguageModel for Florence {
	fn family(&self) -> Family {
		Family::Florence
	}

	fn device(&self) -> Device {
		self.vision.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(
			&mut [&mut self.vision, &mut self.embed, &mut self.encoder, &mut self.decoder],
			device,
		)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, options: &Options) -> Result<String> {
		let (task, text_input) = extract_task(question);
		let prompt = prompt_for(&task, text_input);
		crate::ui::debug(&format!("Florence task: {} prompt=\"{}\"", task, prompt));

		let hidden = self.encode(&prompt, image)?;
		let hidden_len = hidden.shape()[1];

		let generation = self.defaults.config(options);
		let (embed, decoder) = (&mut self.embed, &mut self.decoder);
		let tokens = generate(self.defaults.prefix(), &generation, |tokens| {
			let inputs = embed_tokens(embed, tokens)?;
			let outputs = decoder.session().run(ort::inputs![
				"encoder_attention_mask" => filled_tensor(hidden_len, 1)?,
				"encoder_hidden_states" => array_tensor(&hidden)?,
				"inputs_embeds" => array_tensor(&inputs)?
			])?;
			last_logits(&outputs, "logits")
		})?;

		let generated = self.text.decode(&tokens, false)?;
		let parsed = post_process(&task, &generated, (image.width(), image.height()));
		Ok(extract_answer(parsed, &task))
	}
}

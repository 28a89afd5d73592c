//! GIT: a causal decoder conditioned on image tokens

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::config::{self, Options};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::{generate, GenerationConfig};
use super::processor::{ImageProcessor, TextProcessor, CLIP_MEAN, CLIP_STD};
use super::session::{array_tensor, extract, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["vision_encoder", "decoder_model"];
pub const FILES: &[&str] = &[config::TOKENIZER, config::PREPROCESSOR_CONFIG];
pub const OPTIONAL: &[&str] = &[config::PREPROCESSOR_CONFIG];

const IMAGE_SIZE: u32 = 224;
const MAX_NEW_TOKENS: usize = 20;

pub struct Git {
	vision: Graph,
	decoder: Graph,
	image: ImageProcessor,
	text: TextProcessor,
}

impl Git {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let vision = Graph::load(artifacts, &spec.graph("vision_encoder"), spec.device)
			.context("Failed to load GIT vision encoder")?;
		let decoder = Graph::load(artifacts, &spec.graph("decoder_model"), spec.device)
			.context("Failed to load GIT decoder")?;
		let image = ImageProcessor::load(
			artifacts.optional(config::PREPROCESSOR_CONFIG),
			ImageProcessor::new(IMAGE_SIZE, CLIP_MEAN, CLIP_STD),
		)?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;

		Ok(Self { vision, decoder, image, text })
	}
}

/// `[CLS]` followed by the question's tokens, without a closing `[SEP]`
fn prompt_ids(text: &TextProcessor, question: &str) -> Result<Vec<u32>> {
	let cls = text.first_id(&["[CLS]"])?;
	let mut ids = vec![cls];
	ids.extend(text.encode(question, false)?);
	Ok(ids)
}

impl VisionLanguageModel for Git {
	fn family(&self) -> Family {
		Family::Git
	}

	fn device(&self) -> Device {
		self.vision.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(&mut [&mut self.vision, &mut self.decoder], device)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, _options: &Options) -> Result<String> {
		let pixels = array_tensor(&self.image.preprocess(image))?;
		let image_embeds = {
			let outputs = self.vision.session().run(ort::inputs!["pixel_values" => pixels])?;
			extract(&outputs, "image_embeds")?
		};

		let prefix = prompt_ids(&self.text, question)?;
		let eos = self.text.first_id(&["[SEP]"])?;
		let generation = GenerationConfig::greedy(MAX_NEW_TOKENS, eos);

		let decoder = &mut self.decoder;
		let tokens = generate(prefix, &generation, |tokens| {
			let outputs = decoder.session().run(ort::inputs![
				"input_ids" => ids_tensor(tokens)?,
				"image_embeds" => array_tensor(&image_embeds)?
			])?;
			last_logits(&outputs, "logits")
		})?;

		self.text.decode(&tokens, true)
	}
}

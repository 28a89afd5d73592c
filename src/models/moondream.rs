//! Moondream 2: image embeddings spliced into a causal language model prompt

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{ArrayD, Axis, Slice};

use crate::config::{self, Options};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::{generate, GenerationConfig};
use super::processor::{ImageProcessor, TextProcessor, HALF};
use super::session::{array_tensor, concat_seq, extract, filled_tensor, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["vision_encoder", "embed_tokens", "decoder_model"];
pub const FILES: &[&str] = &[config::TOKENIZER, config::PREPROCESSOR_CONFIG];
pub const OPTIONAL: &[&str] = &[config::PREPROCESSOR_CONFIG];

const IMAGE_SIZE: u32 = 378;
const MAX_NEW_TOKENS: usize = 128;
const END_OF_TEXT: &str = "<|endoftext|>";
const END_MARKER: &str = "<END>";

/// Short questions become a caption request; angle brackets are removed
fn normalize_question(question: &str) -> String {
	let question = if question.chars().count() < 2 {
		config::DEFAULT_QUESTION
	} else {
		question
	};
	question.replace(['<', '>'], "")
}

fn prompt(question: &str) -> String {
	format!("\n\nQuestion: {}\n\nAnswer:", question)
}

fn clean_answer(text: &str) -> String {
	text.replace(END_MARKER, "").trim().to_string()
}

pub struct Moondream {
	vision: Graph,
	embed: Graph,
	decoder: Graph,
	image: ImageProcessor,
	text: TextProcessor,
}

impl Moondream {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let vision = Graph::load(artifacts, &spec.graph("vision_encoder"), spec.device)
			.context("Failed to load Moondream vision encoder")?;
		let embed = Graph::load(artifacts, &spec.graph("embed_tokens"), spec.device)
			.context("Failed to load Moondream token embeddings")?;
		let decoder = Graph::load(artifacts, &spec.graph("decoder_model"), spec.device)
			.context("Failed to load Moondream decoder")?;
		let image = ImageProcessor::load(
			artifacts.optional(config::PREPROCESSOR_CONFIG),
			ImageProcessor::new(IMAGE_SIZE, HALF, HALF),
		)?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;

		Ok(Self { vision, embed, decoder, image, text })
	}
}

fn embed_tokens(embed: &mut Graph, ids: &[u32]) -> Result<ArrayD<f32>> {
	let outputs = embed.session().run(ort::inputs!["input_ids" => ids_tensor(ids)?])?;
	extract(&outputs, "inputs_embeds")
}

impl VisionLanguageModel for Moondream {
	fn family(&self) -> Family {
		Family::Moondream
	}

	fn device(&self) -> Device {
		self.vision.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(&mut [&mut self.vision, &mut self.embed, &mut self.decoder], device)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, _options: &Options) -> Result<String> {
		let pixels = array_tensor(&self.image.preprocess(image))?;
		let image_embeds = {
			let outputs = self.vision.session().run(ort::inputs!["pixel_values" => pixels])?;
			extract(&outputs, "image_features")?
		};

		let eos = self.text.first_id(&[END_OF_TEXT])?;
		let mut prefix = vec![eos];
		prefix.extend(self.text.encode(&prompt(&normalize_question(question)), false)?);
		let prompt_len = prefix.len();

		let generation = GenerationConfig::greedy(MAX_NEW_TOKENS, eos);
		let (embed, decoder) = (&mut self.embed, &mut self.decoder);
		let tokens = generate(prefix, &generation, |tokens| {
			// BOS, then the image, then the prompt and everything generated so far
			let text = embed_tokens(embed, tokens)?;
			let bos = text.slice_axis(Axis(1), Slice::from(..1)).to_owned();
			let rest = text.slice_axis(Axis(1), Slice::from(1..)).to_owned();
			let inputs = concat_seq(&[&bos, &image_embeds, &rest])?;
			let seq = inputs.shape()[1];

			let outputs = decoder.session().run(ort::inputs![
				"inputs_embeds" => array_tensor(&inputs)?,
				"attention_mask" => filled_tensor(seq, 1)?
			])?;
			last_logits(&outputs, "logits")
		})?;

		let answer = self.text.decode(&tokens[prompt_len..], true)?;
		Ok(clean_answer(&answer))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_questions_ask_for_a_description() {
		assert_eq!(normalize_question(""), "Describe the image.");
		assert_eq!(normalize_question("?"), "Describe the image.");
	}

	#[test]
	fn angle_brackets_are_stripped() {
		assert_eq!(normalize_question("<CAPTION> what color?"), "CAPTION what color?");
	}

	#[test]
	fn prompt_frames_the_question() {
		assert_eq!(prompt("Why?"), "\n\nQuestion: Why?\n\nAnswer:");
	}

	#[test]
	fn end_marker_is_removed() {
		assert_eq!(clean_answer("  A red bus.<END> "), "A red bus.");
	}
}

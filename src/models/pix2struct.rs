//! Pix2Struct: variable-resolution patches into an encoder-decoder.
//!
//! The image is standardized, resized so that its patch grid fits
//! `MAX_PATCHES`, and flattened into rows of `[row, col, pixels...]`
//! padded with zeros. A non-empty question becomes the decoder prompt.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array3;
use ort::value::Tensor;

use crate::config::{self, Options};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::{generate, GenerationConfig};
use super::processor::TextProcessor;
use super::session::{array_tensor, extract, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["encoder_model", "decoder_model"];
pub const FILES: &[&str] = &[config::TOKENIZER];
pub const OPTIONAL: &[&str] = &[];

const MAX_PATCHES: usize = 2048;
const PATCH: usize = 16;
const MAX_NEW_TOKENS: usize = 20;
const DECODER_START: u32 = 0;
const EOS: u32 = 1;

/// Flattened patches `[1, max_patches, 2 + patch * patch * 3]` and their mask
fn extract_patches(img: &DynamicImage, max_patches: usize, patch: usize) -> (Array3<f32>, Vec<i64>) {
	let (w, h) = (img.width().max(1) as f32, img.height().max(1) as f32);
	let p = patch as f32;

	let scale = (max_patches as f32 * (p / h) * (p / w)).sqrt();
	let rows = ((scale * h / p).floor() as usize).clamp(1, max_patches);
	let cols = ((scale * w / p).floor() as usize).clamp(1, max_patches);
	let (rows, cols) = if rows * cols > max_patches {
		(rows, (max_patches / rows).max(1))
	} else {
		(rows, cols)
	};

	let resized = img
		.resize_exact((cols * patch) as u32, (rows * patch) as u32, FilterType::Triangle)
		.to_rgb8();
	let pixels = standardize(resized.as_raw());
	let row_width = cols * patch * 3;

	let depth = 2 + patch * patch * 3;
	let mut patches = Array3::<f32>::zeros((1, max_patches, depth));
	let mut mask = vec![0i64; max_patches];

	for r in 0..rows {
		for c in 0..cols {
			let index = r * cols + c;
			patches[[0, index, 0]] = (r + 1) as f32;
			patches[[0, index, 1]] = (c + 1) as f32;

			let mut k = 2;
			for y in 0..patch {
				let start = (r * patch + y) * row_width + c * patch * 3;
				for &v in &pixels[start..start + patch * 3] {
					patches[[0, index, k]] = v;
					k += 1;
				}
			}
			mask[index] = 1;
		}
	}

	(patches, mask)
}

/// Per-image zero mean and unit variance over every channel value
fn standardize(raw: &[u8]) -> Vec<f32> {
	let n = raw.len().max(1) as f32;
	let mean = raw.iter().map(|&v| v as f32).sum::<f32>() / n;
	let var = raw.iter().map(|&v| (v as f32 - mean).powi(2)).sum::<f32>() / n;
	let std = var.sqrt().max(1.0 / n.sqrt());
	raw.iter().map(|&v| (v as f32 - mean) / std).collect()
}

pub struct Pix2Struct {
	encoder: Graph,
	decoder: Graph,
	text: TextProcessor,
}

impl Pix2Struct {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let encoder = Graph::load(artifacts, &spec.graph("encoder_model"), spec.device)
			.context("Failed to load Pix2Struct encoder")?;
		let decoder = Graph::load(artifacts, &spec.graph("decoder_model"), spec.device)
			.context("Failed to load Pix2Struct decoder")?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;

		Ok(Self { encoder, decoder, text })
	}

	fn prefix(&self, question: &str) -> Result<Vec<u32>> {
		let mut ids = vec![DECODER_START];
		if !question.is_empty() {
			ids.extend(self.text.encode(question, false)?);
		}
		Ok(ids)
	}
}

impl VisionLanguageModel for Pix2Struct {
	fn family(&self) -> Family {
		Family::Pix2Struct
	}

	fn device(&self) -> Device {
		self.encoder.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(&mut [&mut self.encoder, &mut self.decoder], device)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, _options: &Options) -> Result<String> {
		let (patches, mask) = extract_patches(image, MAX_PATCHES, PATCH);
		let hidden = {
			let outputs = self.encoder.session().run(ort::inputs![
				"flattened_patches" => array_tensor(&patches)?,
				"attention_mask" => Tensor::from_array((vec![1, mask.len()], mask.clone()))?
			])?;
			extract(&outputs, "last_hidden_state")?
		};

		let prefix = self.prefix(question)?;
		let generation = GenerationConfig::greedy(MAX_NEW_TOKENS, EOS);
		let decoder = &mut self.decoder;
		let tokens = generate(prefix, &generation, |tokens| {
			let outputs = decoder.session().run(ort::inputs![
				"input_ids" => ids_tensor(tokens)?,
				"encoder_hidden_states" => array_tensor(&hidden)?,
				"encoder_attention_mask" => Tensor::from_array((vec![1, mask.len()], mask.clone()))?
			])?;
			last_logits(&outputs, "logits")
		})?;

		self.text.decode(&tokens, true)
	}
}

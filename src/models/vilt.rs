//! ViLT: single forward pass, answer picked from the label vocabulary

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{self, Options};
use crate::core::Family;
use crate::runtime::{Artifacts, Device};

use super::generation::argmax;
use super::processor::{ImageProcessor, TextProcessor, HALF};
use super::session::{array_tensor, filled_tensor, ids_tensor, last_logits, place_all, Graph};
use super::{LoadSpec, VisionLanguageModel};

pub const GRAPHS: &[&str] = &["model"];
pub const FILES: &[&str] = &[config::TOKENIZER, config::MODEL_CONFIG, config::PREPROCESSOR_CONFIG];
pub const OPTIONAL: &[&str] = &[config::PREPROCESSOR_CONFIG];

const IMAGE_SIZE: u32 = 384;
/// Text position embeddings available to the model
const MAX_TEXT_LEN: usize = 40;

#[derive(Debug, Deserialize)]
struct ModelConfig {
	id2label: HashMap<String, String>,
}

/// Answer vocabulary indexed by logit position
#[derive(Debug, Clone, Default)]
struct Labels(HashMap<usize, String>);

impl Labels {
	fn read(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
		Self::parse(&raw).with_context(|| format!("Failed to parse {}", path.display()))
	}

	fn parse(raw: &str) -> Result<Self> {
		let config: ModelConfig = serde_json::from_str(raw)?;
		let mut labels = HashMap::with_capacity(config.id2label.len());
		for (id, label) in config.id2label {
			let id: usize = id.parse().with_context(|| format!("Invalid label id: {}", id))?;
			labels.insert(id, label);
		}
		Ok(Self(labels))
	}

	fn get(&self, index: usize) -> Result<&str> {
		self.0
			.get(&index)
			.map(String::as_str)
			.with_context(|| format!("No label for index {}", index))
	}
}

/// Keep the first tokens and the closing special token when over the limit
fn truncate(mut ids: Vec<u32>, max_len: usize) -> Vec<u32> {
	if ids.len() > max_len && max_len > 0 {
		let last = ids[ids.len() - 1];
		ids.truncate(max_len - 1);
		ids.push(last);
	}
	ids
}

pub struct Vilt {
	model: Graph,
	image: ImageProcessor,
	text: TextProcessor,
	labels: Labels,
}

impl Vilt {
	pub fn load(artifacts: &Artifacts, spec: &LoadSpec) -> Result<Self> {
		let model = Graph::load(artifacts, &spec.graph("model"), spec.device)
			.context("Failed to load ViLT model")?;
		let image = ImageProcessor::load(
			artifacts.optional(config::PREPROCESSOR_CONFIG),
			ImageProcessor::new(IMAGE_SIZE, HALF, HALF),
		)?;
		let text = TextProcessor::load(artifacts.path(config::TOKENIZER)?)?;
		let labels = Labels::read(artifacts.path(config::MODEL_CONFIG)?)?;

		Ok(Self { model, image, text, labels })
	}
}

impl VisionLanguageModel for Vilt {
	fn family(&self) -> Family {
		Family::Vilt
	}

	fn device(&self) -> Device {
		self.model.device()
	}

	fn place(&mut self, device: Device) -> Result<()> {
		place_all(&mut [&mut self.model], device)
	}

	fn answer(&mut self, question: &str, image: &DynamicImage, _options: &Options) -> Result<String> {
		let ids = truncate(self.text.encode(question, true)?, MAX_TEXT_LEN);
		let pixels = self.image.preprocess(image);
		let (w, h) = self.image.size();
		let (w, h) = (w as usize, h as usize);
		let pixel_mask = Tensor::from_array((vec![1, h, w], vec![1i64; h * w]))?;

		let logits = {
			let outputs = self.model.session().run(ort::inputs![
				"input_ids" => ids_tensor(&ids)?,
				"attention_mask" => filled_tensor(ids.len(), 1)?,
				"token_type_ids" => filled_tensor(ids.len(), 0)?,
				"pixel_values" => array_tensor(&pixels)?,
				"pixel_mask" => pixel_mask
			])?;
			last_logits(&outputs, "logits")?
		};

		let index = argmax(&logits).context("Empty logits")?;
		Ok(self.labels.get(index as usize)?.to_string())
	}
}

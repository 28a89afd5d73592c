//! # Vision-Language Models
//!
//! One adapter per model family behind a common trait, an ONNX loader that
//! fetches a family's artifacts, and the single-resident model cache.

pub mod blip;
pub mod florence;
pub mod generation;
pub mod git;
pub mod manager;
pub mod moondream;
pub mod pix2struct;
pub mod processor;
pub mod session;
pub mod vilt;

pub use manager::ModelCache;

use anyhow::Result;
use image::DynamicImage;
use std::fmt;
use std::path::PathBuf;

use crate::config::Options;
use crate::core::{Family, ResolvedModel};
use crate::runtime::{self, Device, Precision};

/// Identifier a resident model was loaded for. The family is part of the
/// key: one repository read by two adapters is two different models.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
	pub repo_id: String,
	pub revision: Option<String>,
	pub family: Family,
}

impl fmt::Display for ModelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.revision {
			Some(rev) => write!(f, "{}@{}", self.repo_id, rev),
			None => f.write_str(&self.repo_id),
		}
	}
}

/// Everything a loader needs to materialize one model
#[derive(Debug, Clone)]
pub struct LoadSpec {
	pub id: ModelId,
	pub family: Family,
	pub cache_dir: Option<PathBuf>,
	pub precision: Precision,
	pub device: Device,
	/// Artifacts whose retrieval may fail without failing the load
	pub optional: Vec<&'static str>,
}

impl LoadSpec {
	pub fn new(model: &ResolvedModel, options: &Options) -> Self {
		Self {
			id: ModelId {
				repo_id: model.repo_id.clone(),
				revision: model.revision.clone(),
				family: model.family,
			},
			family: model.family,
			cache_dir: options.cache_dir.clone(),
			precision: options.precision,
			device: options.device,
			optional: optional_artifacts(model.family).to_vec(),
		}
	}

	/// Repository path of an ONNX graph in the requested precision
	pub fn graph(&self, name: &str) -> String {
		runtime::onnx_file(name, self.precision)
	}
}

/// A loaded model: preprocess, infer and decode one question about one image
pub trait VisionLanguageModel: Send {
	fn family(&self) -> Family;

	fn device(&self) -> Device;

	/// Move the model's graphs to `device` (no-op when already there)
	fn place(&mut self, device: Device) -> Result<()>;

	fn answer(&mut self, question: &str, image: &DynamicImage, options: &Options) -> Result<String>;
}

/// Materializes models; the ONNX implementation fetches and commits graphs
pub trait ModelLoader: Send + Sync {
	fn load(&self, spec: &LoadSpec) -> Result<Box<dyn VisionLanguageModel>>;
}

/// Loads ONNX exports from the hub (or a local directory)
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
	fn load(&self, spec: &LoadSpec) -> Result<Box<dyn VisionLanguageModel>> {
		let files = manifest(spec.family, spec.precision);
		let artifacts = runtime::fetch(
			&spec.id.repo_id,
			spec.id.revision.as_deref(),
			spec.cache_dir.as_deref(),
			&files,
			&spec.optional,
		)?;

		let model: Box<dyn VisionLanguageModel> = match spec.family {
			Family::Git => Box::new(git::Git::load(&artifacts, spec)?),
			Family::Vilt => Box::new(vilt::Vilt::load(&artifacts, spec)?),
			Family::Blip => Box::new(blip::Blip::load(&artifacts, spec)?),
			Family::Pix2Struct => Box::new(pix2struct::Pix2Struct::load(&artifacts, spec)?),
			Family::Moondream => Box::new(moondream::Moondream::load(&artifacts, spec)?),
			Family::Florence => Box::new(florence::Florence::load(&artifacts, spec)?),
		};
		Ok(model)
	}
}

/// Files a family needs from its repository
pub fn manifest(family: Family, precision: Precision) -> Vec<String> {
	let (graphs, files): (&[&str], &[&str]) = match family {
		Family::Git => (git::GRAPHS, git::FILES),
		Family::Vilt => (vilt::GRAPHS, vilt::FILES),
		Family::Blip => (blip::GRAPHS, blip::FILES),
		Family::Pix2Struct => (pix2struct::GRAPHS, pix2struct::FILES),
		Family::Moondream => (moondream::GRAPHS, moondream::FILES),
		Family::Florence => (florence::GRAPHS, florence::FILES),
	};

	files
		.iter()
		.map(|f| f.to_string())
		.chain(graphs.iter().map(|g| runtime::onnx_file(g, precision)))
		.collect()
}

fn optional_artifacts(family: Family) -> &'static [&'static str] {
	match family {
		Family::Git => git::OPTIONAL,
		Family::Vilt => vilt::OPTIONAL,
		Family::Blip => blip::OPTIONAL,
		Family::Pix2Struct => pix2struct::OPTIONAL,
		Family::Moondream => moondream::OPTIONAL,
		Family::Florence => florence::OPTIONAL,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::catalog;

	#[test]
	fn manifests_include_tokenizer_and_graphs() {
		let files = manifest(Family::Florence, Precision::Quantized);
		assert!(files.contains(&"tokenizer.json".to_string()));
		assert!(files.contains(&"onnx/decoder_model_quantized.onnx".to_string()));
		assert!(files.contains(&"generation_config.json".to_string()));
	}

	#[test]
	fn optional_artifacts_are_part_of_the_manifest() {
		let options = Options::default();
		for entry in catalog::CATALOG {
			let model = catalog::resolve(entry.name).unwrap();
			let spec = LoadSpec::new(&model, &options);
			let files = manifest(spec.family, spec.precision);
			for name in &spec.optional {
				assert!(files.iter().any(|f| f == name), "{} missing {}", entry.name, name);
			}
		}
	}

	#[test]
	fn florence_tolerates_missing_generation_config() {
		let options = Options::default();
		let florence = LoadSpec::new(&catalog::resolve("MS Florence 2 Base").unwrap(), &options);
		assert!(florence.optional.contains(&"generation_config.json"));

		let blip = LoadSpec::new(&catalog::resolve("BLIP Base").unwrap(), &options);
		assert!(!blip.optional.contains(&"generation_config.json"));
	}

	#[test]
	fn model_id_display_includes_revision() {
		let id = ModelId {
			repo_id: "vikhyatk/moondream2".into(),
			revision: Some("2024-08-26".into()),
			family: Family::Moondream,
		};
		assert_eq!(id.to_string(), "vikhyatk/moondream2@2024-08-26");
	}
}

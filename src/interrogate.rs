//! # Interrogation Entry Point
//!
//! Resolves the model name, normalizes the image, runs the family adapter on
//! the resident model and collapses failures into plain-text answers.

use std::sync::{Mutex, MutexGuard};

use crate::config::Options;
use crate::core::{catalog, ImageInput, ResolvedModel};
use crate::error::VqaError;
use crate::models::{LoadSpec, ModelCache, ModelId, ModelLoader, OnnxLoader};
use crate::ui;

/// Answer returned for load and inference failures
pub const ERROR_ANSWER: &str = "error";

/// Owns the model cache; calls on one instance are serialized
pub struct Interrogator<L: ModelLoader = OnnxLoader> {
	loader: L,
	options: Options,
	cache: Mutex<ModelCache>,
}

impl Interrogator<OnnxLoader> {
	pub fn new(options: Options) -> Self {
		Self::with_loader(OnnxLoader, options)
	}
}

impl<L: ModelLoader> Interrogator<L> {
	pub fn with_loader(loader: L, options: Options) -> Self {
		Self {
			loader,
			options: options.sanitized(),
			cache: Mutex::new(ModelCache::new()),
		}
	}

	/// Answer `question` about `image` with the catalog model `model_name`
	pub fn ask(
		&self,
		question: &str,
		image: impl Into<ImageInput>,
		model_name: Option<&str>,
	) -> Result<String, VqaError> {
		let image = image.into();
		self.with_housekeeping(|cache| {
			let Some(image) = image.resolve().map_err(VqaError::image)? else {
				return Err(VqaError::NoImage);
			};
			let name = model_name.ok_or(VqaError::NoModel)?;
			let model = catalog::resolve(name).ok_or_else(|| VqaError::UnknownModel {
				name: name.to_string(),
				available: catalog::names(),
			})?;
			self.run(cache, question, &image, &model)
		})
	}

	/// Answer with an already resolved model, e.g. an ad-hoc repository
	pub fn ask_model(
		&self,
		question: &str,
		image: impl Into<ImageInput>,
		model: &ResolvedModel,
	) -> Result<String, VqaError> {
		let image = image.into();
		self.with_housekeeping(|cache| {
			let Some(image) = image.resolve().map_err(VqaError::image)? else {
				return Err(VqaError::NoImage);
			};
			self.run(cache, question, &image, model)
		})
	}

	/// Like [`ask`](Self::ask) but never fails: diagnostics come back as text,
	/// load and inference failures are logged and answered with `"error"`
	pub fn interrogate(&self, question: &str, image: impl Into<ImageInput>, model_name: Option<&str>) -> String {
		collapse(self.ask(question, image, model_name))
	}

	pub fn interrogate_model(&self, question: &str, image: impl Into<ImageInput>, model: &ResolvedModel) -> String {
		collapse(self.ask_model(question, image, model))
	}

	/// Id of the resident model, if any
	pub fn loaded(&self) -> Option<ModelId> {
		self.lock().loaded().cloned()
	}

	/// Number of model loads performed by this instance
	pub fn loads(&self) -> usize {
		self.lock().loads()
	}

	fn run(
		&self,
		cache: &mut ModelCache,
		question: &str,
		image: &image::DynamicImage,
		model: &ResolvedModel,
	) -> Result<String, VqaError> {
		let spec = LoadSpec::new(model, &self.options);
		let repo = spec.id.to_string();
		let vlm = cache.ensure_loaded(&spec, &self.loader)?;
		ui::debug(&format!("Interrogate: vlm=\"{}\" family={}", repo, vlm.family()));

		vlm.place(self.options.device)
			.map_err(|e| VqaError::inference(&repo, e))?;
		vlm.answer(question, image, &self.options)
			.map_err(|e| VqaError::inference(&repo, e))
	}

	/// Run `f` on the cache, then offload the resident model if configured,
	/// whatever `f` returned
	fn with_housekeeping<T>(
		&self,
		f: impl FnOnce(&mut ModelCache) -> Result<T, VqaError>,
	) -> Result<T, VqaError> {
		let mut cache = self.lock();
		let result = f(&mut *cache);

		if self.options.offload {
			if let Err(e) = cache.offload() {
				ui::warn(&format!("Offload failed: {:#}", e));
			}
		}
		result
	}

	fn lock(&self) -> MutexGuard<'_, ModelCache> {
		self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

/// Turn a request result into the text answer shown to callers
fn collapse(result: Result<String, VqaError>) -> String {
	match result {
		Ok(answer) => answer,
		Err(VqaError::NoImage) => String::new(),
		Err(e) if e.is_diagnostic() => e.to_string(),
		Err(e) => {
			ui::error(&format!("VQA: {}", e));
			ERROR_ANSWER.to_string()
		}
	}
}

//! Single-resident model cache

use crate::error::VqaError;
use crate::runtime::Device;

use super::{LoadSpec, ModelId, ModelLoader, VisionLanguageModel};

/// Keeps at most one loaded model, replaced whenever a different id is requested
#[derive(Default)]
pub struct ModelCache {
	resident: Option<(ModelId, Box<dyn VisionLanguageModel>)>,
	loads: usize,
}

impl ModelCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the resident model for `spec`, loading it first on a miss.
	///
	/// The previous model is dropped before loading so two models never
	/// coexist in memory; a failed load therefore leaves the cache empty.
	pub fn ensure_loaded(
		&mut self,
		spec: &LoadSpec,
		loader: &dyn ModelLoader,
	) -> Result<&mut dyn VisionLanguageModel, VqaError> {
		let entry = match self.resident.take() {
			Some(entry) if entry.0 == spec.id => entry,
			previous => {
				drop(previous);
				crate::ui::debug(&format!("Interrogate load: vlm=\"{}\"", spec.id));

				let model = loader
					.load(spec)
					.map_err(|e| VqaError::load(&spec.id.to_string(), e))?;
				self.loads += 1;
				(spec.id.clone(), model)
			}
		};

		Ok(self.resident.insert(entry).1.as_mut())
	}

	/// Id of the resident model, if any
	pub fn loaded(&self) -> Option<&ModelId> {
		self.resident.as_ref().map(|(id, _)| id)
	}

	/// Number of successful loads so far
	pub fn loads(&self) -> usize {
		self.loads
	}

	/// Move the resident model to CPU. Returns whether a model was resident.
	pub fn offload(&mut self) -> anyhow::Result<bool> {
		match self.resident.as_mut() {
			Some((id, model)) => {
				if model.device() != Device::Cpu {
					crate::ui::debug(&format!("Offloading {} to cpu", id));
					model.place(Device::Cpu)?;
				}
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

//! Error taxonomy for interrogation requests

use thiserror::Error;

/// Coarse class of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NoImage,
	NoModel,
	UnknownModel,
	Load,
	Inference,
}

#[derive(Debug, Error)]
pub enum VqaError {
	#[error("no image provided")]
	NoImage,

	#[error("no model selected")]
	NoModel,

	#[error("unknown: model={name} available={available:?}")]
	UnknownModel { name: String, available: Vec<String> },

	#[error("failed to read image: {message}")]
	Image { message: String },

	#[error("failed to load {repo}: {message}")]
	Load { repo: String, message: String },

	#[error("inference failed for {repo}: {message}")]
	Inference { repo: String, message: String },
}

impl VqaError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			VqaError::NoImage => ErrorKind::NoImage,
			VqaError::NoModel => ErrorKind::NoModel,
			VqaError::UnknownModel { .. } => ErrorKind::UnknownModel,
			VqaError::Image { .. } | VqaError::Load { .. } => ErrorKind::Load,
			VqaError::Inference { .. } => ErrorKind::Inference,
		}
	}

	/// Expected, user-facing conditions that are answered with plain text
	pub fn is_diagnostic(&self) -> bool {
		matches!(
			self.kind(),
			ErrorKind::NoImage | ErrorKind::NoModel | ErrorKind::UnknownModel
		)
	}

	pub(crate) fn image(err: anyhow::Error) -> Self {
		VqaError::Image {
			message: format!("{:#}", err),
		}
	}

	pub(crate) fn load(repo: &str, err: anyhow::Error) -> Self {
		VqaError::Load {
			repo: repo.to_string(),
			message: format!("{:#}", err),
		}
	}

	pub(crate) fn inference(repo: &str, err: anyhow::Error) -> Self {
		VqaError::Inference {
			repo: repo.to_string(),
			message: format!("{:#}", err),
		}
	}
}

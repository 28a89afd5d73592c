//! # ONNX Runtime
//!
//! Session creation, execution provider selection and artifact retrieval.

pub mod hub;
pub mod providers;

pub use hub::{fetch, onnx_file, Artifacts};
pub use providers::{create_session, set_provider};

use std::fmt;

/// Where a model's sessions execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
	/// The execution provider selected with `--provider`
	#[default]
	Accelerator,
	/// Plain CPU execution
	Cpu,
}

impl fmt::Display for Device {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Device::Accelerator => write!(f, "accelerator"),
			Device::Cpu => write!(f, "cpu"),
		}
	}
}

/// Numeric variant of the ONNX graphs to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
	#[default]
	Full,
	/// Int8 weight-quantized export (inputs and outputs stay f32)
	Quantized,
}

impl Precision {
	pub fn suffix(&self) -> &'static str {
		match self {
			Precision::Full => "",
			Precision::Quantized => crate::config::QUANTIZED_SUFFIX,
		}
	}
}

//! Execution provider selection

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::Mutex;

use super::Device;
use crate::ui;

pub use crate::cli::Provider;

static SELECTED_PROVIDER: Mutex<Provider> = Mutex::new(Provider::Auto);
static PROVIDER_LOGGED: Mutex<bool> = Mutex::new(false);

pub fn set_provider(p: Provider) {
	if let Ok(mut selected) = SELECTED_PROVIDER.lock() {
		*selected = p;
	}
}

fn get_provider() -> Provider {
	SELECTED_PROVIDER.lock().map(|p| *p).unwrap_or_default()
}

fn log_once(msg: &str) {
	if let Ok(mut logged) = PROVIDER_LOGGED.lock() {
		if !*logged {
			ui::info(msg);
			*logged = true;
		}
	}
}

/// Build a session for one ONNX graph on the requested device.
///
/// Also returns the device the session actually runs on: an accelerator
/// request that registers no execution provider resolves to `Device::Cpu`.
pub fn create_session(model_path: &Path, device: Device) -> Result<(Session, Device)> {
	let mut builder = Session::builder().context("Failed to create session builder")?;

	let accelerated = match (device, get_provider()) {
		(Device::Cpu, _) => {
			ui::debug(&format!("CPU session: {}", model_path.display()));
			false
		}
		(Device::Accelerator, Provider::Auto) => register_best(&mut builder),
		(Device::Accelerator, Provider::Cpu) => {
			log_once("Using CPU execution provider (forced)");
			false
		}
		(Device::Accelerator, Provider::Cuda) => {
			let ok = try_cuda(&mut builder);
			if !ok {
				ui::error("CUDA requested but unavailable, falling back to CPU");
			}
			ok
		}
		(Device::Accelerator, Provider::Tensorrt) => {
			let ok = try_tensorrt(&mut builder);
			if !ok {
				ui::error("TensorRT requested but unavailable, falling back to CPU");
			}
			ok
		}
		(Device::Accelerator, Provider::Coreml) => {
			#[cfg(target_os = "macos")]
			let ok = try_coreml(&mut builder);
			#[cfg(not(target_os = "macos"))]
			let ok = false;
			if !ok {
				ui::error("CoreML requested but unavailable, falling back to CPU");
			}
			ok
		}
		(Device::Accelerator, Provider::Xnnpack) => {
			let ok = try_xnnpack(&mut builder);
			if !ok {
				ui::error("XNNPACK requested but unavailable, falling back to CPU");
			}
			ok
		}
	};

	let session = builder
		.with_optimization_level(GraphOptimizationLevel::Level3)?
		.with_intra_threads(4)?
		.commit_from_file(model_path)
		.with_context(|| format!("Failed to load graph {}", model_path.display()))?;

	let effective = if accelerated { Device::Accelerator } else { Device::Cpu };
	Ok((session, effective))
}

/// Register the first available provider; false when none is
fn register_best(builder: &mut ort::session::builder::SessionBuilder) -> bool {
	if try_tensorrt(builder) {
		return true;
	}
	if try_cuda(builder) {
		return true;
	}

	#[cfg(target_os = "macos")]
	if try_coreml(builder) {
		return true;
	}

	if try_xnnpack(builder) {
		return true;
	}

	log_once("Using CPU execution provider");
	false
}

macro_rules! try_provider {
	($builder:expr, $provider_type:ty, $name:expr) => {{
		use ort::ep::ExecutionProvider;

		crate::ui::debug(&format!("Trying provider: {}", $name));

		let provider = <$provider_type>::default();
		if !provider.is_available().unwrap_or(false) {
			crate::ui::debug(&format!("{} not available", $name));
			return false;
		}

		match provider.register($builder) {
			Ok(_) => {
				if let Ok(mut logged) = PROVIDER_LOGGED.lock() {
					if !*logged {
						crate::ui::success(&format!("Using {} execution provider", $name));
						*logged = true;
					}
				}
				true
			}
			Err(e) => {
				crate::ui::debug(&format!("{} registration failed: {}", $name, e));
				false
			}
		}
	}};
}

fn try_cuda(builder: &mut ort::session::builder::SessionBuilder) -> bool {
	use ort::ep::CUDA;
	try_provider!(builder, CUDA, "CUDA")
}

#[cfg(target_os = "macos")]
fn try_coreml(builder: &mut ort::session::builder::SessionBuilder) -> bool {
	use ort::ep::CoreML;
	try_provider!(builder, CoreML, "CoreML")
}

fn try_tensorrt(builder: &mut ort::session::builder::SessionBuilder) -> bool {
	use ort::ep::TensorRT;
	try_provider!(builder, TensorRT, "TensorRT")
}

fn try_xnnpack(builder: &mut ort::session::builder::SessionBuilder) -> bool {
	use ort::ep::XNNPACK;
	try_provider!(builder, XNNPACK, "XNNPACK")
}

//! ONNX graph handles and tensor plumbing shared by the adapters

use anyhow::{Context, Result};
use ndarray::{ArrayD, Axis, IxDyn};
use ort::session::{Session, SessionOutputs};
use ort::value::Tensor;
use std::path::PathBuf;

use crate::runtime::{create_session, Artifacts, Device};

/// Where a graph runs, and whether the accelerator is known to fall back to CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
	device: Device,
	cpu_only: bool,
}

impl Placement {
	/// Record a session requested on `requested` that ended up on `effective`
	pub fn new(requested: Device, effective: Device) -> Self {
		Self {
			device: effective,
			cpu_only: requested == Device::Accelerator && effective == Device::Cpu,
		}
	}

	pub fn device(&self) -> Device {
		self.device
	}

	/// Device a move to `requested` would land on, or `None` when the current
	/// session already runs there
	pub fn target(&self, requested: Device) -> Option<Device> {
		let target = if self.cpu_only { Device::Cpu } else { requested };
		(target != self.device).then_some(target)
	}

	/// Fold in the outcome of a move to `requested`
	pub fn settle(&mut self, requested: Device, effective: Device) {
		let cpu_only = self.cpu_only;
		*self = Self::new(requested, effective);
		self.cpu_only |= cpu_only;
	}
}

/// One ONNX graph, re-committed whenever it moves between devices
pub struct Graph {
	path: PathBuf,
	session: Session,
	placement: Placement,
}

impl Graph {
	pub fn load(artifacts: &Artifacts, file: &str, device: Device) -> Result<Self> {
		let path = artifacts.path(file)?.to_path_buf();
		let (session, effective) = create_session(&path, device)?;
		Ok(Self {
			path,
			session,
			placement: Placement::new(device, effective),
		})
	}

	/// Device the current session actually runs on
	pub fn device(&self) -> Device {
		self.placement.device()
	}

	/// Move the graph to `device`; a no-op when the session already runs
	/// where the move would land. The previous session is dropped, releasing
	/// its memory.
	pub fn place(&mut self, device: Device) -> Result<()> {
		let Some(target) = self.placement.target(device) else {
			return Ok(());
		};
		crate::ui::debug(&format!("Placing {} on {}", self.file_name(), target));
		let (session, effective) = create_session(&self.path, target)?;
		self.session = session;
		self.placement.settle(target, effective);
		Ok(())
	}

	pub fn session(&mut self) -> &mut Session {
		&mut self.session
	}

	fn file_name(&self) -> String {
		self.path
			.file_name()
			.map(|n| n.to_string_lossy().to_string())
			.unwrap_or_default()
	}
}

/// Place every graph of a model, stopping at the first failure
pub fn place_all(graphs: &mut [&mut Graph], device: Device) -> Result<()> {
	for graph in graphs.iter_mut() {
		graph.place(device)?;
	}
	Ok(())
}

/// `[1, n]` int64 tensor of token ids
pub fn ids_tensor(ids: &[u32]) -> Result<Tensor<i64>> {
	let data: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
	Tensor::from_array((vec![1, ids.len()], data)).context("Failed to create ids tensor")
}

/// `[1, n]` int64 tensor filled with `value`
pub fn filled_tensor(len: usize, value: i64) -> Result<Tensor<i64>> {
	Tensor::from_array((vec![1, len], vec![value; len])).context("Failed to create mask tensor")
}

/// f32 tensor from any ndarray, copied in logical order
pub fn array_tensor<D: ndarray::Dimension>(array: &ndarray::Array<f32, D>) -> Result<Tensor<f32>> {
	let shape = array.shape().to_vec();
	let data: Vec<f32> = array.iter().copied().collect();
	Tensor::from_array((shape, data)).context("Failed to create f32 tensor")
}

/// Copy a named f32 output into an owned array
pub fn extract(outputs: &SessionOutputs, name: &str) -> Result<ArrayD<f32>> {
	let value = outputs
		.get(name)
		.with_context(|| format!("No {} output found", name))?;
	let (shape, data) = value.try_extract_tensor::<f32>()?;
	let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
	ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
		.with_context(|| format!("Output {} has inconsistent shape {:?}", name, dims))
}

/// Logits for the last position of a `[1, seq, vocab]` (or `[1, vocab]`) output
pub fn last_logits(outputs: &SessionOutputs, name: &str) -> Result<Vec<f32>> {
	let logits = extract(outputs, name)?;
	last_row(&logits)
}

pub fn last_row(logits: &ArrayD<f32>) -> Result<Vec<f32>> {
	match logits.shape() {
		[1, seq, _] if *seq > 0 => Ok(logits
			.index_axis(Axis(0), 0)
			.index_axis(Axis(0), seq - 1)
			.iter()
			.copied()
			.collect()),
		[1, _] => Ok(logits.index_axis(Axis(0), 0).iter().copied().collect()),
		other => anyhow::bail!("Unexpected logits shape: {:?}", other),
	}
}

/// Join `[1, a, d]` and `[1, b, d]` into `[1, a + b, d]`
pub fn concat_seq(parts: &[&ArrayD<f32>]) -> Result<ArrayD<f32>> {
	let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
	ndarray::concatenate(Axis(1), &views).context("Failed to concatenate embeddings")
}

//! Ask command - answer one question about one image

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;

use crate::core::{ImageInput, ResolvedModel};
use crate::interrogate::Interrogator;
use crate::ui;

pub fn run(
	interrogator: &Interrogator,
	question: &str,
	image: Option<&Path>,
	model: Option<&str>,
	repo: Option<&str>,
) -> Result<()> {
	let input = match image {
		Some(path) => {
			ui::info(&format!("Image: {}", ui::path_link(path, 60)));
			ImageInput::from_path(path)
		}
		None => {
			ui::warn("No image provided (use -i/--image)");
			ImageInput::None
		}
	};

	let start = Instant::now();
	let (label, answer) = match repo {
		Some(repo_id) => {
			let resolved = ResolvedModel::from_repo(repo_id)
				.ok_or_else(|| anyhow!("Cannot tell the model family of '{}'", repo_id))?;
			ui::debug(&format!("Resolved {} as {}", repo_id, resolved.family));
			(repo_id.to_string(), interrogator.interrogate_model(question, input, &resolved))
		}
		None => (
			model.unwrap_or("-").to_string(),
			interrogator.interrogate(question, input, model),
		),
	};

	ui::answer(&label, &answer, start.elapsed().as_millis());
	Ok(())
}

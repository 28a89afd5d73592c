//! Model artifact retrieval from the Hugging Face hub or a local directory

use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::Precision;
use crate::config::ONNX_DIR;
use crate::ui;

/// Files resolved for one model load
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
	repo: String,
	files: HashMap<String, PathBuf>,
}

impl Artifacts {
	pub fn new(repo: impl Into<String>) -> Self {
		Self {
			repo: repo.into(),
			files: HashMap::new(),
		}
	}

	pub fn insert(&mut self, name: impl Into<String>, path: PathBuf) {
		self.files.insert(name.into(), path);
	}

	/// Path of a required artifact
	pub fn path(&self, name: &str) -> Result<&Path> {
		self.files
			.get(name)
			.map(PathBuf::as_path)
			.with_context(|| format!("Artifact {} missing from {}", name, self.repo))
	}

	/// Path of an artifact that may have been skipped
	pub fn optional(&self, name: &str) -> Option<&Path> {
		self.files.get(name).map(PathBuf::as_path)
	}
}

/// Name of an ONNX graph inside a repository for the given precision
pub fn onnx_file(graph: &str, precision: Precision) -> String {
	format!("{}/{}{}.onnx", ONNX_DIR, graph, precision.suffix())
}

/// Resolve `files` for `repo_id`, pinned to `revision` when given.
///
/// A `repo_id` naming an existing directory is read in place. Otherwise the
/// files are downloaded through the hub into `cache_dir`. Failures on names
/// listed in `optional` are logged and skipped; any other failure aborts.
pub fn fetch(
	repo_id: &str,
	revision: Option<&str>,
	cache_dir: Option<&Path>,
	files: &[String],
	optional: &[&str],
) -> Result<Artifacts> {
	let local = Path::new(repo_id);
	if local.is_dir() {
		return fetch_local(local, files, optional);
	}

	let mut builder = ApiBuilder::new().with_progress(false);
	if let Some(dir) = cache_dir {
		builder = builder.with_cache_dir(dir.to_path_buf());
	}
	let api = builder.build().context("Failed to initialize hub client")?;

	let repo = match revision {
		Some(rev) => Repo::with_revision(repo_id.to_string(), RepoType::Model, rev.to_string()),
		None => Repo::new(repo_id.to_string(), RepoType::Model),
	};
	let repo = api.repo(repo);

	let mut artifacts = Artifacts::new(repo_id);
	for name in files {
		match repo.get(name) {
			Ok(path) => {
				ui::debug(&format!("Fetched {}: {}", name, path.display()));
				artifacts.insert(name.clone(), path);
			}
			Err(e) if optional.contains(&name.as_str()) => {
				ui::debug(&format!("Skipping optional {}: {}", name, e));
			}
			Err(e) => {
				return Err(e).with_context(|| format!("Failed to fetch {} from {}", name, repo_id));
			}
		}
	}

	Ok(artifacts)
}

fn fetch_local(dir: &Path, files: &[String], optional: &[&str]) -> Result<Artifacts> {
	let mut artifacts = Artifacts::new(dir.display().to_string());

	for name in files {
		let path = dir.join(name);
		if path.is_file() {
			artifacts.insert(name.clone(), path);
		} else if optional.contains(&name.as_str()) {
			ui::debug(&format!("Skipping optional {}: not in {}", name, dir.display()));
		} else {
			anyhow::bail!("Artifact not found: {}", path.display());
		}
	}

	Ok(artifacts)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn onnx_names_follow_precision() {
		assert_eq!(onnx_file("decoder_model", Precision::Full), "onnx/decoder_model.onnx");
		assert_eq!(
			onnx_file("decoder_model", Precision::Quantized),
			"onnx/decoder_model_quantized.onnx"
		);
	}

	#[test]
	fn local_directory_skips_optional_files() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();

		let files = vec!["tokenizer.json".to_string(), "generation_config.json".to_string()];
		let artifacts = fetch(
			dir.path().to_str().unwrap(),
			None,
			None,
			&files,
			&["generation_config.json"],
		)
		.unwrap();

		assert!(artifacts.path("tokenizer.json").is_ok());
		assert!(artifacts.optional("generation_config.json").is_none());
	}

	#[test]
	fn local_directory_requires_mandatory_files() {
		let dir = tempfile::tempdir().unwrap();
		let files = vec!["onnx/model.onnx".to_string()];
		let err = fetch(dir.path().to_str().unwrap(), None, None, &files, &[]).unwrap_err();
		assert!(err.to_string().contains("not found"));
	}
}

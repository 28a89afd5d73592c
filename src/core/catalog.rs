//! Static model catalog and family resolution

use std::fmt;

/// Model family, one per input/output adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
	/// Causal LM over image tokens (GIT)
	Git,
	/// Classification-style answers from label logits (ViLT)
	Vilt,
	/// Question answering with generated answers (BLIP)
	Blip,
	/// Conditional generation over image patches (Pix2Struct)
	Pix2Struct,
	/// Causal LM with a dedicated image encoder (Moondream)
	Moondream,
	/// Task-prompted encoder-decoder (Florence-2)
	Florence,
}

/// Substring keywords in detection order; first match wins
const KEYWORDS: &[(&str, Family)] = &[
	("git", Family::Git),
	("vilt", Family::Vilt),
	("blip", Family::Blip),
	("pix", Family::Pix2Struct),
	("moondream2", Family::Moondream),
	("florence", Family::Florence),
];

impl Family {
	/// Infer the family from a repository id (case-insensitive)
	pub fn detect(repo_id: &str) -> Option<Self> {
		let lower = repo_id.to_lowercase();
		KEYWORDS
			.iter()
			.find(|(keyword, _)| lower.contains(keyword))
			.map(|(_, family)| *family)
	}

	pub fn name(&self) -> &'static str {
		match self {
			Family::Git => "git",
			Family::Vilt => "vilt",
			Family::Blip => "blip",
			Family::Pix2Struct => "pix2struct",
			Family::Moondream => "moondream",
			Family::Florence => "florence",
		}
	}
}

impl fmt::Display for Family {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
	pub name: &'static str,
	/// Repository id, optionally suffixed with `@<revision>`
	pub repo: &'static str,
	pub family: Family,
	/// Approximate download size
	pub size: &'static str,
}

pub const CATALOG: &[CatalogEntry] = &[
	CatalogEntry { name: "MS Florence 2 Base", repo: "microsoft/Florence-2-base", family: Family::Florence, size: "0.5GB" },
	CatalogEntry { name: "MS Florence 2 Large", repo: "microsoft/Florence-2-large", family: Family::Florence, size: "1.5GB" },
	CatalogEntry { name: "MiaoshouAI PromptGen 1.5 Base", repo: "MiaoshouAI/Florence-2-base-PromptGen-v1.5@c06a5f02cc6071a5d65ee5d294cf3732d3097540", family: Family::Florence, size: "1.1GB" },
	CatalogEntry { name: "MiaoshouAI PromptGen 1.5 Large", repo: "MiaoshouAI/Florence-2-large-PromptGen-v1.5@28a42440e39c9c32b83f7ae74ec2b3d1540404f0", family: Family::Florence, size: "3.3GB" },
	CatalogEntry { name: "MiaoshouAI PromptGen 2.0 Base", repo: "MiaoshouAI/Florence-2-base-PromptGen-v2.0", family: Family::Florence, size: "1.1GB" },
	CatalogEntry { name: "MiaoshouAI PromptGen 2.0 Large", repo: "MiaoshouAI/Florence-2-large-PromptGen-v2.0", family: Family::Florence, size: "3.3GB" },
	CatalogEntry { name: "CogFlorence 2.0 Large", repo: "thwri/CogFlorence-2-Large-Freeze", family: Family::Florence, size: "1.6GB" },
	CatalogEntry { name: "CogFlorence 2.2 Large", repo: "thwri/CogFlorence-2.2-Large", family: Family::Florence, size: "1.6GB" },
	CatalogEntry { name: "Moondream 2", repo: "vikhyatk/moondream2@2024-08-26", family: Family::Moondream, size: "3.7GB" },
	CatalogEntry { name: "GIT TextCaps Base", repo: "microsoft/git-base-textcaps", family: Family::Git, size: "0.7GB" },
	CatalogEntry { name: "GIT VQA Base", repo: "microsoft/git-base-vqav2", family: Family::Git, size: "0.7GB" },
	CatalogEntry { name: "GIT VQA Large", repo: "microsoft/git-large-vqav2", family: Family::Git, size: "1.6GB" },
	CatalogEntry { name: "BLIP Base", repo: "Salesforce/blip-vqa-base", family: Family::Blip, size: "1.5GB" },
	CatalogEntry { name: "BLIP Large", repo: "Salesforce/blip-vqa-capfilt-large", family: Family::Blip, size: "1.5GB" },
	CatalogEntry { name: "ViLT Base", repo: "dandelin/vilt-b32-finetuned-vqa", family: Family::Vilt, size: "0.5GB" },
	CatalogEntry { name: "Pix Textcaps", repo: "google/pix2struct-textcaps-base", family: Family::Pix2Struct, size: "1.1GB" },
];

/// A catalog entry (or ad-hoc repository) ready for loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
	pub repo_id: String,
	pub revision: Option<String>,
	pub family: Family,
}

impl ResolvedModel {
	/// Resolve an ad-hoc `repo[@revision]` by keyword detection
	pub fn from_repo(id: &str) -> Option<Self> {
		let (repo_id, revision) = split_revision(id);
		let family = Family::detect(repo_id)?;
		Some(Self {
			repo_id: repo_id.to_string(),
			revision: revision.map(str::to_string),
			family,
		})
	}
}

/// Split `repo@revision` into its parts
pub fn split_revision(id: &str) -> (&str, Option<&str>) {
	match id.split_once('@') {
		Some((repo, rev)) if !rev.is_empty() => (repo, Some(rev)),
		Some((repo, _)) => (repo, None),
		None => (id, None),
	}
}

pub fn find(name: &str) -> Option<&'static CatalogEntry> {
	CATALOG.iter().find(|e| e.name == name)
}

/// Resolve a display name to a loadable model
pub fn resolve(name: &str) -> Option<ResolvedModel> {
	let entry = find(name)?;
	let (repo_id, revision) = split_revision(entry.repo);
	Some(ResolvedModel {
		repo_id: repo_id.to_string(),
		revision: revision.map(str::to_string),
		family: entry.family,
	})
}

pub fn names() -> Vec<String> {
	CATALOG.iter().map(|e| e.name.to_string()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn catalog_tags_match_detection() {
		for entry in CATALOG {
			let (repo, _) = split_revision(entry.repo);
			assert_eq!(Family::detect(repo), Some(entry.family), "{}", entry.name);
		}
	}

	#[test]
	fn revision_is_split_off() {
		let model = resolve("MiaoshouAI PromptGen 1.5 Base").unwrap();
		assert_eq!(model.repo_id, "MiaoshouAI/Florence-2-base-PromptGen-v1.5");
		assert_eq!(
			model.revision.as_deref(),
			Some("c06a5f02cc6071a5d65ee5d294cf3732d3097540")
		);
		assert!(!model.repo_id.contains('@'));
	}

	#[test]
	fn plain_repo_has_no_revision() {
		let model = resolve("BLIP Base").unwrap();
		assert_eq!(model.repo_id, "Salesforce/blip-vqa-base");
		assert_eq!(model.revision, None);
		assert_eq!(model.family, Family::Blip);
	}

	#[test]
	fn unknown_name_resolves_to_none() {
		assert!(resolve("GPT Vision 9000").is_none());
		assert!(resolve("blip base").is_none());
	}

	#[test]
	fn detection_order_first_match_wins() {
		// "git" precedes "florence" in the keyword order
		assert_eq!(Family::detect("someone/digit-florence"), Some(Family::Git));
		assert_eq!(Family::detect("ORG/BLIP-VQA"), Some(Family::Blip));
		assert_eq!(Family::detect("org/llava-1.5"), None);
	}

	#[test]
	fn ad_hoc_repo_resolution() {
		let model = ResolvedModel::from_repo("onnx-community/Florence-2-base@main").unwrap();
		assert_eq!(model.family, Family::Florence);
		assert_eq!(model.revision.as_deref(), Some("main"));
		assert!(ResolvedModel::from_repo("org/unknown").is_none());
	}

	#[test]
	fn empty_revision_suffix_is_ignored() {
		assert_eq!(split_revision("org/model@"), ("org/model", None));
	}
}

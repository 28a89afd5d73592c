//! Image input normalization

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Anything a caller may hand over as "the image"
#[derive(Debug, Clone, Default)]
pub enum ImageInput {
	#[default]
	None,
	Image(DynamicImage),
	/// Only the first element is used
	List(Vec<ImageInput>),
	/// An image on disk, decoded on demand
	Reference { path: PathBuf },
}

impl ImageInput {
	pub fn from_path(path: impl Into<PathBuf>) -> Self {
		ImageInput::Reference { path: path.into() }
	}

	/// Resolve to a decoded image. `Ok(None)` means no image was supplied.
	pub fn resolve(self) -> Result<Option<DynamicImage>> {
		match self {
			ImageInput::None => Ok(None),
			ImageInput::Image(img) => Ok(Some(img)),
			ImageInput::List(items) => match items.into_iter().next() {
				Some(first) => first.resolve(),
				None => Ok(None),
			},
			ImageInput::Reference { path } => open(&path).map(Some),
		}
	}
}

impl From<DynamicImage> for ImageInput {
	fn from(img: DynamicImage) -> Self {
		ImageInput::Image(img)
	}
}

impl From<Option<DynamicImage>> for ImageInput {
	fn from(img: Option<DynamicImage>) -> Self {
		img.map(ImageInput::Image).unwrap_or_default()
	}
}

impl From<Vec<DynamicImage>> for ImageInput {
	fn from(images: Vec<DynamicImage>) -> Self {
		ImageInput::List(images.into_iter().map(ImageInput::Image).collect())
	}
}

impl From<&Path> for ImageInput {
	fn from(path: &Path) -> Self {
		ImageInput::from_path(path)
	}
}

/// Decode an image file
pub fn open(path: &Path) -> Result<DynamicImage> {
	crate::ui::debug(&format!("Opening image: {}", path.display()));
	image::open(path).with_context(|| {
		format!(
			"Failed to open image. File may be corrupted or in an unsupported format: {}",
			path.display()
		)
	})
}

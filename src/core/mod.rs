//! Core domain types

pub mod catalog;
pub mod input;
pub mod task;

pub use catalog::{CatalogEntry, Family, ResolvedModel, CATALOG};
pub use input::ImageInput;
pub use task::TaskToken;

//! # Seer Library
//!
//! Visual question answering over a catalog of vision-language models
//! (GIT, BLIP, ViLT, Pix2Struct, Moondream, Florence-2) exported to ONNX.
//! One model stays resident and is swapped when another is requested.

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod interrogate;
pub mod models;
pub mod runtime;
pub mod ui;

pub use config::Options;
pub use error::{ErrorKind, VqaError};
pub use interrogate::Interrogator;

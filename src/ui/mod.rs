//! # User Interface
//!
//! Colored terminal output with clickable file links.

pub mod log;

pub use log::{answer, debug, error, header, info, path_link, success, warn, Log};

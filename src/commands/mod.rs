//! # Command Implementations
//!
//! Each submodule handles one CLI command (ask, models, tasks, repl).

pub mod ask;
pub mod models;
pub mod repl;
pub mod tasks;

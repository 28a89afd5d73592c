//! Tasks command - list Florence task tokens

use colored::*;

use crate::config::DEFAULT_TASK;
use crate::core::TaskToken;
use crate::ui;

pub fn run() {
	ui::header("Florence task tokens");

	for token in TaskToken::ALL {
		let prompt = token.prompt("<text>");
		let note = if prompt == token.as_str() {
			"fine-tuned token, sent verbatim".to_string()
		} else {
			prompt
		};
		println!("  {:32} {}", token.as_str().yellow(), note.dimmed());
	}

	println!();
	ui::info(&format!("Questions without a leading task token use {}", DEFAULT_TASK));
}

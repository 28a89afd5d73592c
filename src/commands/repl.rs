//! REPL mode - interactive questions about one image

use anyhow::{bail, Result};
use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use crate::core::{catalog, input};
use crate::interrogate::Interrogator;
use crate::ui;

pub fn run(interrogator: &Interrogator, image: &Path, model: &str) -> Result<()> {
	if catalog::find(model).is_none() {
		bail!(
			"Unknown model '{}'. Run 'seer models' to list available models",
			model
		);
	}

	// Decode once; every question reuses the same pixels
	let img = input::open(image)?;

	ui::info(&format!("Asking {} about {}", model.bright_blue(), ui::path_link(image, 60)));
	ui::info("Type your questions, or 'exit' to quit");
	println!();

	loop {
		print!("{} ", "seer>".bright_blue().bold());
		io::stdout().flush()?;

		let mut line = String::new();
		if io::stdin().read_line(&mut line)? == 0 {
			break;
		}

		let question = line.trim();

		if question == "exit" || question == "quit" || question == "q" {
			ui::info("Goodbye!");
			break;
		}

		if question == "help" {
			show_help();
			continue;
		}

		let start = Instant::now();
		let answer = interrogator.interrogate(question, img.clone(), Some(model));
		ui::answer(model, &answer, start.elapsed().as_millis());

		if let Some(id) = interrogator.loaded() {
			ui::debug(&format!("Resident: {} ({} loads)", id, interrogator.loads()));
		}
		println!();
	}

	Ok(())
}

fn show_help() {
	println!("{}", "REPL Commands:".bright_blue().bold());
	println!("  {}  Ask a question (empty asks for a caption)", "<text>".dimmed());
	println!("  {}  Run a Florence task, e.g. <OCR>", "<TASK>".dimmed());
	println!("  {}    Show this help message", "help".dimmed());
	println!("  {}    Exit REPL mode", "exit".dimmed());
}

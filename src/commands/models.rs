//! Models command - list the catalog

use colored::*;

use crate::core::CATALOG;
use crate::ui;

pub fn run() {
	ui::header(&format!("{} models", CATALOG.len()));

	let width = CATALOG.iter().map(|e| e.name.len()).max().unwrap_or(0);
	for entry in CATALOG {
		println!(
			"  {:width$}  {:10}  {:>6}  {}",
			entry.name.bright_white(),
			entry.family.to_string().yellow(),
			entry.size.dimmed(),
			entry.repo.dimmed(),
			width = width,
		);
	}
	println!();
}

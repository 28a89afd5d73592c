//! Unified logging system

use colored::*;
use rand::RngExt;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

const LOGO: &str = r#"
   ________  ___  _____
  / ___/ _ \/ _ \/ ___/
 (__  )  __/  __/ /
/____/\___/\___/_/     "#;

const SLOGANS: &[&str] = &[
	"Ask the pixels",
	"It's a cat. It's always a cat.",
	"Describe the image. No, in more detail.",
	"<MORE_DETAILED_CAPTION> intensifies",
	"Beam search, not beam me up",
	"Is that a muffin? Asking for a Chihuahua",
	"Seeing is believing, answering is harder",
	"A picture is worth a thousand tokens",
];

pub fn random_slogan() -> &'static str {
	let idx = rand::rng().random_range(0..SLOGANS.len());
	SLOGANS[idx]
}

pub fn print_logo() {
	println!("{}", LOGO.bright_blue().bold());
	println!("{}", random_slogan().dimmed().italic());
}

pub struct Log;

impl Log {
	pub fn set_verbose(enabled: bool) {
		VERBOSE.store(enabled, Ordering::Relaxed);
	}

	pub fn is_verbose() -> bool {
		VERBOSE.load(Ordering::Relaxed)
	}
}

pub fn info(msg: &str) {
	println!("{} {}", "ℹ".bright_blue().bold(), msg.bright_white());
}

pub fn success(msg: &str) {
	println!("{} {}", "✓".bright_green().bold(), msg.bright_white());
}

pub fn warn(msg: &str) {
	println!("{} {}", "⚠".bright_yellow().bold(), msg.bright_white());
}

pub fn error(msg: &str) {
	eprintln!("{} {}", "✗".bright_red().bold(), msg.bright_white());
}

pub fn debug(msg: &str) {
	if Log::is_verbose() {
		println!("{} {}", "⚙".bright_black().bold(), msg.dimmed());
	}
}

pub fn header(text: &str) {
	println!("\n{}", text.bright_blue().bold());
}

/// Clickable file path (OSC 8 terminal hyperlink)
pub fn path_link(path: &std::path::Path, max_len: usize) -> String {
	let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

	let uri = if cfg!(windows) {
		let path_str = absolute.to_string_lossy();
		let cleaned = path_str.strip_prefix(r"\\?\").unwrap_or(&path_str);
		format!("file:///{}", cleaned.replace('\\', "/"))
	} else {
		format!("file://{}", absolute.display())
	};

	let filename = path
		.file_name()
		.and_then(|n| n.to_str())
		.unwrap_or("unknown");

	let display_name = if filename.chars().count() > max_len {
		let head: String = filename.chars().take(max_len / 2).collect();
		let tail_len = (max_len / 2).saturating_sub(3);
		let tail: String = filename
			.chars()
			.rev()
			.take(tail_len)
			.collect::<Vec<_>>()
			.into_iter()
			.rev()
			.collect();
		format!("{}...{}", head, tail)
	} else {
		filename.to_string()
	};

	format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", uri, display_name)
}

/// Print an answer with its model and timing
pub fn answer(model: &str, text: &str, duration_ms: u128) {
	println!(
		"{} {} {}",
		"➜".bright_green().bold(),
		text.bright_white(),
		format!("[{} · {}ms]", model, duration_ms).dimmed()
	);
}

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::{builder::Styles, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::Options;
use crate::runtime::Precision;

/// Execution provider for ONNX Runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Provider {
	/// Auto-detect best available (TensorRT → CUDA → CoreML → XNNPACK → CPU)
	#[default]
	Auto,
	/// CPU only
	Cpu,
	/// NVIDIA CUDA GPU
	Cuda,
	/// NVIDIA TensorRT (optimized inference)
	Tensorrt,
	/// Apple CoreML (macOS only)
	Coreml,
	/// XNNPACK (optimized CPU kernels)
	Xnnpack,
}

fn parse_positive(s: &str) -> Result<usize, String> {
	let val: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
	if val == 0 {
		Err("value must be at least 1".to_string())
	} else {
		Ok(val)
	}
}

fn styled(color: AnsiColor) -> Style {
	Style::new().fg_color(Some(Color::Ansi(color)))
}

fn styles() -> Styles {
	Styles::styled()
		.header(styled(AnsiColor::Blue).bold())
		.usage(styled(AnsiColor::Blue).bold())
		.literal(styled(AnsiColor::Blue))
		.placeholder(styled(AnsiColor::Yellow))
		.valid(styled(AnsiColor::Blue))
		.invalid(styled(AnsiColor::Red))
}

#[derive(Parser, Debug)]
#[command(
	name = "seer",
	author,
	version,
	about = "Visual question answering with local vision-language models",
	styles = styles(),
	disable_help_subcommand = true,
	after_help = format!(
		"{title}
  {seer} {ask}     {ask_args}   {ask_desc}
  {seer} {ask}     {task_args}            {task_desc}
  {seer} {models}                                          {models_desc}
  {seer} {repl}    {repl_args}           {repl_desc}",
		title = "Examples:".bright_blue().bold(),
		seer = "seer".bright_blue(),
		ask = "ask".yellow(),
		ask_args = "\"What color is the car?\" -i car.png -m \"BLIP Base\"",
		ask_desc = "Answer a question".dimmed(),
		task_args = "\"<OCR>\" -i scan.png -m \"MS Florence 2 Base\"",
		task_desc = "Run a task prompt".dimmed(),
		models = "models".yellow(),
		models_desc = "List available models".dimmed(),
		repl = "repl".yellow(),
		repl_args = "-i car.png -m \"Moondream 2\"",
		repl_desc = "Ask questions interactively".dimmed(),
	),
)]
pub struct Cli {
	/// Enable verbose debug output
	#[arg(short = 'v', long = "verbose", global = true)]
	pub verbose: bool,

	/// Execution provider: auto, cpu, cuda, tensorrt, coreml, xnnpack
	#[arg(short = 'p', long = "provider", global = true, default_value = "auto")]
	pub provider: Provider,

	/// Directory for downloaded model artifacts
	#[arg(long = "cache-dir", global = true, value_name = "DIR")]
	pub cache_dir: Option<PathBuf>,

	/// Maximum generated tokens for task-prompt models
	#[arg(long = "max-length", global = true, value_parser = parse_positive)]
	pub max_length: Option<usize>,

	/// Beam width for task-prompt models
	#[arg(long = "beams", global = true, value_parser = parse_positive)]
	pub beams: Option<usize>,

	/// Keep the model on the accelerator between questions
	#[arg(long = "no-offload", global = true)]
	pub no_offload: bool,

	/// Use int8-quantized model graphs
	#[arg(long = "quantized", global = true)]
	pub quantized: bool,

	#[command(subcommand)]
	pub command: Command,
}

impl Cli {
	/// Environment defaults with command-line overrides applied
	pub fn options(&self) -> Options {
		let mut options = Options::from_env();

		if let Some(dir) = &self.cache_dir {
			options.cache_dir = Some(dir.clone());
		}
		if let Some(n) = self.max_length {
			options.max_length = n;
		}
		if let Some(n) = self.beams {
			options.num_beams = n;
		}
		if self.no_offload {
			options.offload = false;
		}
		if self.quantized {
			options.precision = Precision::Quantized;
		}

		options.sanitized()
	}
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Ask a question about an image
	Ask {
		/// Question, optionally starting with a task token such as <OCR>
		#[arg(value_name = "QUESTION", default_value = "")]
		question: String,

		/// Image to ask about
		#[arg(short = 'i', long = "image", value_name = "PATH")]
		image: Option<PathBuf>,

		/// Model display name (see `seer models`)
		#[arg(short = 'm', long = "model", value_name = "NAME", conflicts_with = "repo")]
		model: Option<String>,

		/// Repository id, optionally pinned as ID@REVISION, or a local directory
		#[arg(long = "repo", value_name = "ID")]
		repo: Option<String>,
	},

	/// List the model catalog
	Models,

	/// List task tokens understood by Florence models
	Tasks,

	/// Ask several questions about one image, keeping the model loaded
	Repl {
		/// Image to ask about
		#[arg(short = 'i', long = "image", value_name = "PATH")]
		image: PathBuf,

		/// Model display name (see `seer models`)
		#[arg(short = 'm', long = "model", value_name = "NAME")]
		model: String,
	},

	/// Show help for a subcommand
	Help {
		/// Subcommand name
		subcommand: Option<String>,
	},
}

//! Seer - ask questions about images from the command line

use anyhow::Result;
use clap::{CommandFactory, Parser};

use seer::cli::{Cli, Command};
use seer::commands;
use seer::interrogate::Interrogator;
use seer::runtime::set_provider;
use seer::ui::{self, Log};

fn main() {
	if let Err(e) = run() {
		ui::error(&format!("{:#}", e));
		std::process::exit(1);
	}
}

fn run() -> Result<()> {
	let cli = Cli::parse();

	Log::set_verbose(cli.verbose);
	set_provider(cli.provider);

	match &cli.command {
		Command::Ask { question, image, model, repo } => {
			ui::log::print_logo();
			let interrogator = Interrogator::new(cli.options());
			commands::ask::run(
				&interrogator,
				question,
				image.as_deref(),
				model.as_deref(),
				repo.as_deref(),
			)
		}
		Command::Models => {
			commands::models::run();
			Ok(())
		}
		Command::Tasks => {
			commands::tasks::run();
			Ok(())
		}
		Command::Repl { image, model } => {
			ui::log::print_logo();
			let interrogator = Interrogator::new(cli.options());
			commands::repl::run(&interrogator, image, model)
		}
		Command::Help { subcommand } => {
			let mut cmd = Cli::command();
			if let Some(sub) = subcommand {
				if let Some(sub_cmd) = cmd.find_subcommand_mut(sub) {
					sub_cmd.print_help()?;
					return Ok(());
				}
				ui::warn(&format!("Unknown subcommand: {}", sub));
			}
			cmd.print_help()?;
			Ok(())
		}
	}
}

mod apps;
mod cloudformation;
mod commands;
mod config;
mod error;
mod logger;
mod probe;
mod runner;
mod stacks;
use crate::commands::Commands;
use crate::config::GlobalArgs;
use crate::error::Error;
use crate::logger::Logger;
use crate::runner::{Config, Runnable, Runner};
use clap::Parser;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Derive a runner from the command and run it
async fn run(command: impl Runnable, config: &Config) -> Result<(), Error> {
    command.runner(config).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(error) = color_eyre::install() {
        eprintln!("Failed to install the error reporter: {error}");
    }

    Logger::init();
    let cli = Cli::parse();

    let result = match Config::load(cli.global) {
        // Match all commands here, in one place
        Ok(config) => match cli.command {
            Commands::Synth(cmd) => run(cmd, &config).await,
            Commands::List(cmd) => run(cmd, &config).await,
            Commands::Diff(cmd) => run(cmd, &config).await,
            Commands::Deploy(cmd) => run(cmd, &config).await,
            Commands::Destroy(cmd) => run(cmd, &config).await,
            Commands::Probe(cmd) => run(cmd, &config).await,
        },
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}\n{error}", console::style("Error").red().bold());
            ExitCode::FAILURE
        }
    }
}

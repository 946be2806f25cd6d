pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "answerbot",
    about = "answerbot operator CLI",
    long_about = "Prepare the context store, inspect effective configuration, purge expired context, and check runtime readiness.",
    after_help = "Examples:\n  answerbot doctor\n  answerbot config\n  answerbot purge"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create the context and message-metadata tables when missing")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Delete expired context and message-metadata rows")]
    Purge,
    #[command(about = "Validate config, secret resolution, and DB connectivity")]
    Doctor,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Purge => commands::purge::run(),
        Command::Doctor => commands::doctor::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

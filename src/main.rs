//! nixgen - NixOS generation manager
//!
//! Lists, diffs, deletes and activates NixOS system generations.
//!
//! Features:
//! - List generations with version, kernel and specialisation metadata
//! - Delete generations by number, range, age or retention policy
//! - Build and activate configurations (flakes or channels)
//! - Switch to or roll back to existing generations
//! - Restore the previous generation when activation fails
//!
//! Usage: nixgen [--profile NAME] [-v] <generation|apply> ...

mod activation;
mod cli;
mod config;
mod deletion;
mod display;
mod error;
mod nix;
mod privilege;
mod prompt;
mod retention;
mod types;

use activation::{ActivationEngine, ApplyRequest, SwitchRequest};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, GenerationCommands};
use config::Config;
use crossterm::style::Stylize;
use deletion::DeletionExecutor;
use nix::build::NixBuilder;
use nix::commands::SystemRunner;
use nix::detect::resolve_source;
use nix::diff::Differ;
use nix::generations::{find_generation, gather_generations};
use privilege::RootCommand;
use prompt::TerminalPrompt;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use types::{current_system_path, Outcome, Profile};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(exit_code(&e));
    }
}

/// Log to stderr; `RUST_LOG` overrides the `-v` level
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<error::Error>()
        .map(error::Error::exit_code)
        .unwrap_or(1)
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let profile = cli
        .profile
        .as_deref()
        .map(Profile::named)
        .unwrap_or_default();
    debug!("profile '{}' in {}", profile.name, profile.directory.display());

    let runner = SystemRunner;
    let builder = NixBuilder::new(&runner);
    let prompt = TerminalPrompt;
    let root = RootCommand::new(config.root_command.clone());
    let differ = Differ::from_options(&config.diff);

    let engine = ActivationEngine {
        runner: &runner,
        builder: &builder,
        prompt: &prompt,
        privileges: &root,
        differ: &differ,
        config: &config,
        profile: &profile,
        current_system: current_system_path().to_path_buf(),
    };

    let outcome = match cli.command {
        Commands::Generation(GenerationCommands::List { json }) => {
            let generations = gather_generations(&profile)?;
            if json {
                display::print_generations_json(&generations)?;
            } else {
                display::print_generations(&profile.name, &generations);
            }
            Outcome::Completed
        }
        Commands::Generation(GenerationCommands::Diff { before, after }) => {
            let before = find_generation(&profile, before)?;
            let after = find_generation(&profile, after)?;
            let report = differ.diff(
                &runner,
                &profile.generation_path(before.number),
                &profile.generation_path(after.number),
            )?;
            if report.is_empty() {
                println!("No closure changes.");
            } else {
                print!("{}", report.text);
            }
            Outcome::Completed
        }
        Commands::Generation(GenerationCommands::Switch { number, activation }) => {
            engine.switch_generation(number, &SwitchRequest::from(activation))?
        }
        Commands::Generation(GenerationCommands::Rollback { activation }) => {
            engine.rollback_generation(&SwitchRequest::from(activation))?
        }
        Commands::Generation(GenerationCommands::Delete(args)) => {
            let spec = args.to_spec()?;
            let executor = DeletionExecutor {
                runner: &runner,
                prompt: &prompt,
                privileges: &root,
                config: &config,
                profile: &profile,
            };
            executor.delete(&spec, args.yes)?
        }
        Commands::Apply(args) => {
            let source = resolve_source(args.flake.as_deref(), args.file.as_deref(), &config)?;
            debug!("configuration source {:?}", source);
            engine.apply(&source, &ApplyRequest::from(&args))?
        }
    };

    match outcome {
        Outcome::Completed => {}
        Outcome::Declined => println!("{}", "Aborted; nothing was changed.".yellow()),
        Outcome::NothingToDo(reason) => println!("{}", reason),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_from_typed_error() {
        let e = anyhow::Error::new(error::Error::validation("bad flag"));
        assert_eq!(exit_code(&e), error::EXIT_VALIDATION);

        let e = anyhow::Error::new(error::Error::CommandFailed {
            command: "nix-build".into(),
            code: Some(100),
        })
        .context("Build failed");
        assert_eq!(exit_code(&e), 100);
    }

    #[test]
    fn test_exit_code_for_untyped_error() {
        let e = anyhow::anyhow!("Failed to load configuration");
        assert_eq!(exit_code(&e), 1);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = anyhow::Error::new(error::Error::resource(PathBuf::from("/nix"), io));
        assert_eq!(exit_code(&e), error::EXIT_RESOURCE_ACCESS);
    }
}

//! CLI module for Leaseflow
//!
//! - `serve`: HTTP API server
//! - `drain`: one delivery cycle over every queue, for cron
//! - `definition`: validate or publish workflow definition files

pub mod definition;
pub mod drain;
pub mod serve;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Leaseflow - versioned deal workflow orchestration
#[derive(Parser)]
#[command(name = "leaseflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Deliver due queue rows once and exit
    Drain(drain::DrainArgs),

    /// Work with workflow definition files
    #[command(subcommand)]
    Definition(definition::DefinitionCommand),
}

/// Loads `.env` and layered configuration, falling back to defaults
pub(crate) fn load_config() -> AppConfig {
    dotenvy::dotenv().ok();

    match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

/// Plain logging for one-shot commands
pub(crate) fn init_command_logging(config: &AppConfig) {
    logging::init_logging(&config.logging);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drain_limit() {
        let cli = Cli::try_parse_from(["leaseflow", "drain", "--limit", "25"]).unwrap();
        match cli.command {
            Command::Drain(args) => assert_eq!(args.limit, Some(25)),
            _ => panic!("expected drain"),
        }
    }

    #[test]
    fn test_parse_definition_publish() {
        let cli = Cli::try_parse_from([
            "leaseflow",
            "definition",
            "publish",
            "workflows/fast-lease-v1.yaml",
            "--activate",
        ])
        .unwrap();

        match cli.command {
            Command::Definition(definition::DefinitionCommand::Publish(args)) => {
                assert!(args.activate);
                assert_eq!(args.path.to_string_lossy(), "workflows/fast-lease-v1.yaml");
            }
            _ => panic!("expected definition publish"),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["leaseflow", "ui"]).is_err());
    }
}

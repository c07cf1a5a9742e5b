//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::init::InitArgs;
use super::commands::sweep::SweepArgs;
use super::commands::template::TemplateArgs;

#[derive(Parser, Debug)]
#[command(name = "approvalflow")]
#[command(about = "approvalflow - approval workflow task engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .approvalflow/config.yaml plus environment)
    #[arg(short, long, global = true, env = "APPROVALFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database, apply migrations and write a default config
    Init(InitArgs),

    /// Workflow template management
    Template(TemplateArgs),

    /// Transition overdue approval tasks to timeout
    Sweep(SweepArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::template::TemplateCommands;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_template_import_with_globals() {
        let cli = Cli::try_parse_from([
            "approvalflow",
            "template",
            "import",
            "leave.yaml",
            "--json",
            "--config",
            "/etc/approvalflow.yaml",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/approvalflow.yaml")));
        match cli.command {
            Commands::Template(args) => match args.command {
                TemplateCommands::Import { file } => assert_eq!(file, PathBuf::from("leave.yaml")),
                other => panic!("unexpected template command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sweep_once() {
        let cli = Cli::try_parse_from(["approvalflow", "sweep", "--once", "--interval", "5"]).unwrap();
        match cli.command {
            Commands::Sweep(args) => {
                assert!(args.once);
                assert_eq!(args.interval, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sweep_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["approvalflow", "sweep", "--interval", "0"]).is_err());
    }
}

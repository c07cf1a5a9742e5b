//! approvalflow CLI entry point.

use anyhow::Result;
use clap::Parser;

use approvalflow::cli::{handle_error, Cli, Commands};
use approvalflow::domain::models::Config;
use approvalflow::infrastructure::config::ConfigLoader;
use approvalflow::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json_mode);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config: Config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Init(args) => {
            approvalflow::cli::commands::init::execute(args, &config, cli.config.as_deref(), cli.json)
                .await
        }
        Commands::Template(args) => {
            approvalflow::cli::commands::template::execute(args, &config, cli.json).await
        }
        Commands::Sweep(args) => {
            approvalflow::cli::commands::sweep::execute(args, &config, cli.json).await
        }
    }
}

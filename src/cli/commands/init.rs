//! Implementation of the `approvalflow init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::adapters::sqlite::{all_embedded_migrations, initialize_database};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

/// Where `init` writes the config when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".approvalflow/config.yaml";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub database_path: String,
    pub migrations: usize,
    pub config_path: PathBuf,
    pub config_written: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        lines.push(format!(
            "\nDatabase ready at {} ({} migration(s) embedded)",
            self.database_path, self.migrations
        ));
        if self.config_written {
            lines.push(format!("Wrote default configuration to {}", self.config_path.display()));
        } else {
            lines.push(format!(
                "Kept existing configuration at {} (use --force to overwrite)",
                self.config_path.display()
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(
    args: InitArgs,
    config: &Config,
    config_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let pool = initialize_database(&config.database)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let config_path = config_path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), Path::to_path_buf);
    let config_written = write_config(config, &config_path, args.force).await?;

    tracing::info!(
        database = %config.database.path,
        config = %config_path.display(),
        config_written,
        "approvalflow initialized"
    );

    let output_data = InitOutput {
        success: true,
        message: "approvalflow initialized successfully.".to_string(),
        database_path: config.database.path.clone(),
        migrations: all_embedded_migrations().len(),
        config_path,
        config_written,
    };
    output(&output_data, json_mode);
    Ok(())
}

/// Write the effective configuration as YAML unless a file already exists.
async fn write_config(config: &Config, path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    fs::write(path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

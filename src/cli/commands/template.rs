//! Workflow template CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::adapters::sqlite::{initialize_database, SqliteTemplateRepository};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Template};
use crate::domain::ports::TemplateRepository;

#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub command: TemplateCommands,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// Store a template from YAML, as version 1 or the next version of an existing id
    Import {
        /// Path to the template YAML file
        file: PathBuf,
    },
    /// List stored versions of a template
    Versions {
        /// Template ID
        id: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    pub id: String,
    pub name: String,
    pub version: i64,
    pub nodes: usize,
    pub edges: usize,
    pub created: bool,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        let verb = if self.created { "Created" } else { "Updated" };
        format!(
            "{verb} template '{}' ({}) at version {}: {} node(s), {} edge(s)",
            self.id, self.name, self.version, self.nodes, self.edges
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct VersionsOutput {
    pub id: String,
    pub versions: Vec<i64>,
}

impl CommandOutput for VersionsOutput {
    fn to_human(&self) -> String {
        if self.versions.is_empty() {
            return format!("No versions stored for template '{}'.", self.id);
        }
        let list: Vec<String> = self.versions.iter().map(i64::to_string).collect();
        format!(
            "Template '{}' has {} version(s): {}",
            self.id,
            self.versions.len(),
            list.join(", ")
        )
    }
}

pub async fn execute(args: TemplateArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = initialize_database(&config.database)
        .await
        .context("Failed to open database")?;
    let repo = SqliteTemplateRepository::new(pool);

    match args.command {
        TemplateCommands::Import { file } => {
            let result = import(&repo, &file).await?;
            output(&result, json_mode);
        }
        TemplateCommands::Versions { id } => {
            let versions = repo
                .list_versions(&id)
                .await
                .with_context(|| format!("Failed to list versions of '{id}'"))?;
            output(&VersionsOutput { id, versions }, json_mode);
        }
    }
    Ok(())
}

/// Parse a template file and store it, creating or versioning as needed.
pub async fn import<R: TemplateRepository>(repo: &R, file: &Path) -> Result<ImportOutput> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let template: Template = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse template YAML in {}", file.display()))?;

    let existing = repo.list_versions(&template.id).await?;
    let created = existing.is_empty();
    let stored = if created {
        repo.create(&template).await
    } else {
        repo.update(&template).await
    }
    .with_context(|| format!("Failed to store template '{}'", template.id))?;

    tracing::info!(
        template_id = %stored.id,
        version = stored.version,
        created,
        "Template imported"
    );

    Ok(ImportOutput {
        id: stored.id,
        name: stored.name,
        version: stored.version,
        nodes: stored.nodes.len(),
        edges: stored.edges.len(),
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use std::io::Write;

    const LEAVE_YAML: &str = r"
id: leave
name: Leave request
nodes:
  start:
    id: start
    name: Start
    type: start
  manager:
    id: manager
    name: Manager
    type: approval
    config:
      approvers: [alice]
      require_comment: true
  end:
    id: end
    name: End
    type: end
edges:
  - from: start
    to: manager
  - from: manager
    to: end
";

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_import_creates_then_versions() {
        let repo = SqliteTemplateRepository::new(create_migrated_test_pool().await.unwrap());
        let file = yaml_file(LEAVE_YAML);

        let first = import(&repo, file.path()).await.unwrap();
        assert!(first.created);
        assert_eq!(first.version, 1);
        assert_eq!(first.nodes, 3);
        assert_eq!(first.edges, 2);

        let second = import(&repo, file.path()).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.version, 2);

        assert_eq!(repo.list_versions("leave").await.unwrap(), vec![1, 2]);
        let stored = repo.get("leave", 0).await.unwrap();
        assert_eq!(stored.node("manager").unwrap().default_approvers(), ["alice"]);
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_template() {
        let repo = SqliteTemplateRepository::new(create_migrated_test_pool().await.unwrap());
        let file = yaml_file("id: broken\nname: Broken\nnodes: {}\n");

        let err = import(&repo, file.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
        assert!(repo.list_versions("broken").await.unwrap().is_empty());
    }

    #[test]
    fn test_versions_output() {
        let empty = VersionsOutput { id: "leave".into(), versions: vec![] };
        assert!(empty.to_human().contains("No versions"));
        let some = VersionsOutput { id: "leave".into(), versions: vec![1, 2] };
        assert_eq!(some.to_human(), "Template 'leave' has 2 version(s): 1, 2");
    }
}

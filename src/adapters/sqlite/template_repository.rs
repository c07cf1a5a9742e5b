//! SQLite implementation of the TemplateRepository.
//!
//! Each version is its own row; `update` appends `latest + 1` and never
//! rewrites an existing version.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::format_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Template;
use crate::domain::ports::{TemplateRepository, LATEST_VERSION};

#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn latest_version(&self, id: &str) -> DomainResult<Option<i64>> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM workflow_templates WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn store(&self, template: &Template, version: i64) -> DomainResult<Template> {
        let mut stored = template.clone();
        stored.version = version;
        stored.created_at = Utc::now();
        let definition = serde_json::to_string(&stored)?;

        sqlx::query(
            r#"INSERT INTO workflow_templates (id, version, name, description, definition, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&stored.id)
        .bind(stored.version)
        .bind(&stored.name)
        .bind(&stored.description)
        .bind(&definition)
        .bind(format_datetime(&stored.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                DomainError::ConcurrencyConflict {
                    entity: "template".to_string(),
                    id: format!("{}@{}", stored.id, stored.version),
                }
            } else {
                DomainError::from(e)
            }
        })?;

        tracing::info!(template_id = %stored.id, version = stored.version, "Template stored");
        Ok(stored)
    }
}

#[async_trait]
impl TemplateRepository for SqliteTemplateRepository {
    async fn get(&self, id: &str, version: i64) -> DomainResult<Template> {
        let row: Option<TemplateRow> = if version == LATEST_VERSION {
            sqlx::query_as(
                "SELECT version, definition FROM workflow_templates WHERE id = ? ORDER BY version DESC LIMIT 1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT version, definition FROM workflow_templates WHERE id = ? AND version = ?",
            )
            .bind(id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?
        };

        let row = row.ok_or_else(|| DomainError::TemplateNotFound {
            id: id.to_string(),
            version,
        })?;
        let mut template: Template = serde_json::from_str(&row.definition)?;
        template.version = row.version;
        Ok(template)
    }

    async fn create(&self, template: &Template) -> DomainResult<Template> {
        template.validate().map_err(DomainError::ValidationFailed)?;
        if self.latest_version(&template.id).await?.is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "Template '{}' already exists; update it to add a version",
                template.id
            )));
        }
        self.store(template, 1).await
    }

    async fn update(&self, template: &Template) -> DomainResult<Template> {
        template.validate().map_err(DomainError::ValidationFailed)?;
        let latest = self.latest_version(&template.id).await?.ok_or_else(|| {
            DomainError::TemplateNotFound {
                id: template.id.clone(),
                version: LATEST_VERSION,
            }
        })?;
        self.store(template, latest + 1).await
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM workflow_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TemplateNotFound {
                id: id.to_string(),
                version: LATEST_VERSION,
            });
        }
        Ok(())
    }

    async fn list_versions(&self, id: &str) -> DomainResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT version FROM workflow_templates WHERE id = ? ORDER BY version")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    version: i64,
    definition: String,
}

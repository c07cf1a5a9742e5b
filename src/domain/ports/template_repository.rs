use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Template;

/// Version number meaning "whatever is newest".
pub const LATEST_VERSION: i64 = 0;

/// Repository port for versioned, immutable templates.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Fetch a template version; `LATEST_VERSION` resolves to the newest.
    async fn get(&self, id: &str, version: i64) -> DomainResult<Template>;

    /// Store the first version of a new template.
    async fn create(&self, template: &Template) -> DomainResult<Template>;

    /// Store a new version (`latest + 1`); earlier versions are untouched.
    async fn update(&self, template: &Template) -> DomainResult<Template>;

    /// Remove every version of a template.
    async fn delete(&self, id: &str) -> DomainResult<()>;

    /// Stored versions, ascending.
    async fn list_versions(&self, id: &str) -> DomainResult<Vec<i64>>;
}

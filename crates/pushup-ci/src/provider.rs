//! CI provider seam: pull-request comments and the optional artifact cache.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::{CiError, Result};

/// Marker identifying comments created by this tool.
pub const COMMENT_IDENTIFIER: &str = "<!-- generated by @code-pushup/ci -->";

/// A pull-request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Optional capability: previously uploaded reports of the base commit.
#[async_trait]
pub trait ReportArtifactSource: Send + Sync {
    /// Download the base report artifact for `project` (whole repository when
    /// `None`). `Ok(None)` means no artifact exists.
    async fn download_report_artifact(&self, project: Option<&str>) -> Result<Option<PathBuf>>;
}

/// Provider API consumed by the core.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn list_comments(&self) -> Result<Vec<Comment>>;

    async fn create_comment(&self, body: &str) -> Result<Comment>;

    async fn update_comment(&self, id: u64, body: &str) -> Result<Comment>;

    /// Artifact cache, when the provider has one.
    fn artifacts(&self) -> Option<&dyn ReportArtifactSource> {
        None
    }
}

/// Provider for runs outside a CI platform: no comments and no artifact
/// cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

#[async_trait]
impl ProviderApi for LocalProvider {
    async fn list_comments(&self) -> Result<Vec<Comment>> {
        Ok(Vec::new())
    }

    async fn create_comment(&self, _body: &str) -> Result<Comment> {
        Err(CiError::Provider(
            "local runs cannot post pull-request comments".to_string(),
        ))
    }

    async fn update_comment(&self, _id: u64, _body: &str) -> Result<Comment> {
        Err(CiError::Provider(
            "local runs cannot post pull-request comments".to_string(),
        ))
    }
}

/// Post the diff markdown at `md_path`, updating the earlier comment carrying
/// [`COMMENT_IDENTIFIER`] if there is one. Returns the comment id.
pub async fn comment_on_pr(md_path: &Path, api: &dyn ProviderApi) -> Result<u64> {
    let markdown = tokio::fs::read_to_string(md_path).await?;
    let body = format!("{}\n\n{COMMENT_IDENTIFIER}\n", markdown.trim_end());

    let comments = api.list_comments().await?;
    debug!(count = comments.len(), "fetched pull-request comments");

    let existing = comments
        .iter()
        .find(|comment| comment.body.contains(COMMENT_IDENTIFIER));

    let comment = match existing {
        Some(prev) => {
            let comment = api.update_comment(prev.id, &body).await?;
            info!(id = comment.id, url = ?comment.url, "updated pull-request comment");
            comment
        }
        None => {
            let comment = api.create_comment(&body).await?;
            info!(id = comment.id, url = ?comment.url, "created pull-request comment");
            comment
        }
    };
    Ok(comment.id)
}

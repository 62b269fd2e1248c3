//! Error taxonomy for the CI core.
//!
//! Three classes matter to callers:
//! - fallback errors (artifact download, print-config probe) are converted into
//!   absent results where the fallback lives and never escape a run;
//! - invariant violations (dirty tree, failed restore, wrong HEAD) are hard failures;
//! - process failures carry the captured output and are not retried.

/// Errors produced by the CI core.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("working tree has local changes, refusing to switch branches: {files:?}")]
    LocalChanges { files: Vec<String> },

    #[error("failed to restore checkout: expected HEAD at {expected}, found {actual}")]
    CheckoutRestore { expected: String, actual: String },

    #[error("HEAD is at {actual} but the run was requested for {expected}")]
    HeadMismatch { expected: String, actual: String },

    #[error("command `{command}` exited with code {exit_code}: {stderr}")]
    Process {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("command `{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("report artifact download failed: {0}")]
    ArtifactDownload(String),

    #[error("print-config failed: {0}")]
    PrintConfig(String),

    #[error("persisted file not found: {0}")]
    MissingOutput(String),

    #[error("monorepo error: {0}")]
    Monorepo(String),

    #[error("provider API error: {0}")]
    Provider(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CiError {
    /// Invariant violations that leave the shared working tree unsafe for any
    /// further project in the same run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CiError::LocalChanges { .. }
                | CiError::CheckoutRestore { .. }
                | CiError::HeadMismatch { .. }
        )
    }
}

/// Result type for CI core operations.
pub type Result<T> = std::result::Result<T, CiError>;

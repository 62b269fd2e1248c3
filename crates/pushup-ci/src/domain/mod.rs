//! Domain models for the CI core.
//!
//! - `GitRefs`: head and optional base commits of a run
//! - `Settings`: immutable per-invocation configuration
//! - `ProjectConfig`: one monorepo member
//! - `RunResult`: what the CI provider receives

pub mod error;
pub mod project;
pub mod refs;
pub mod result;
pub mod settings;

pub use error::{CiError, Result};
pub use project::{project_to_name, ProjectConfig};
pub use refs::{GitBranch, GitRefs};
pub use result::{OutputFiles, ProjectFailure, ProjectFiles, ProjectRunResult, RunResult};
pub use settings::{MonorepoMode, Parallelism, Settings};

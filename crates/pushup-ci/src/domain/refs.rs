//! Git refs identifying the analyzed commit and its comparison base.

use serde::{Deserialize, Serialize};

/// Immutable pointer to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitBranch {
    /// Human-facing ref name (e.g. `main`, `feature/login`).
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Commit actually analyzed.
    pub sha: String,
}

impl GitBranch {
    pub fn new(git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
            sha: sha.into(),
        }
    }

    /// First 7 characters of the SHA.
    pub fn short_sha(&self) -> &str {
        match self.sha.char_indices().nth(7) {
            Some((end, _)) => &self.sha[..end],
            None => &self.sha,
        }
    }
}

/// Head and optional base of one invocation.
///
/// `base` is present exactly when running in comparison (pull-request) mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRefs {
    pub head: GitBranch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<GitBranch>,
}

impl GitRefs {
    /// Refs for a push (head-only) run.
    pub fn head_only(head: GitBranch) -> Self {
        Self { head, base: None }
    }

    /// Refs for a pull-request run.
    pub fn with_base(head: GitBranch, base: GitBranch) -> Self {
        Self {
            head,
            base: Some(base),
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.base.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_serialize_ref_field_name() {
        let refs = GitRefs::with_base(
            GitBranch::new("feature", "1111111111"),
            GitBranch::new("main", "2222222222"),
        );
        let value = serde_json::to_value(&refs).expect("serialize");
        assert_eq!(value["head"]["ref"], "feature");
        assert_eq!(value["base"]["sha"], "2222222222");
        assert!(refs.is_comparison());
    }

    #[test]
    fn test_head_only_omits_base() {
        let refs = GitRefs::head_only(GitBranch::new("main", "abc"));
        let value = serde_json::to_value(&refs).expect("serialize");
        assert!(value.get("base").is_none());
        assert!(!refs.is_comparison());
    }

    #[test]
    fn test_short_sha_handles_short_input() {
        assert_eq!(GitBranch::new("main", "abcdef0123").short_sha(), "abcdef0");
        assert_eq!(GitBranch::new("main", "abc").short_sha(), "abc");
    }

    #[test]
    fn test_short_sha_respects_char_boundaries() {
        assert_eq!(GitBranch::new("main", "ééééé").short_sha(), "ééééé");
        assert_eq!(GitBranch::new("main", "éééééééé").short_sha(), "ééééééé");
    }
}

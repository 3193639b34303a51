//! Operation requests accepted by the access mediator.
//!
//! Every tool and resource call is reduced to an [`OperationRequest`]: the
//! target repository plus one [`Operation`] variant carrying the
//! operation-specific fields. Inputs are assumed to be bound-checked by the
//! protocol front-end before they get here.

use std::fmt;

use rmcp::schemars;
use serde::{Deserialize, Serialize};

/// A repository on GitHub, as given by the caller (case preserved).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// `owner/repo` exactly as supplied.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Case-folded `owner/repo`, the form stored in the allowlist.
    pub fn allow_key(&self) -> String {
        self.full_name().to_lowercase()
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// State filter for issues, milestones and pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Open,
    Closed,
    All,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
            ItemState::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(ItemState::Open),
            "closed" => Some(ItemState::Closed),
            "all" => Some(ItemState::All),
            _ => None,
        }
    }
}

/// How a pull request gets merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Squash,
    Merge,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Squash => "squash",
            MergeMethod::Merge => "merge",
            MergeMethod::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListIssues {
        state: ItemState,
        per_page: u8,
    },
    SearchIssues {
        query: String,
        per_page: u8,
    },
    CreateIssue {
        title: String,
        body: String,
    },
    CommentOnIssue {
        issue_number: u64,
        body: String,
    },
    ListLabels {
        per_page: u8,
    },
    AddLabel {
        issue_number: u64,
        labels: Vec<String>,
    },
    RemoveLabel {
        issue_number: u64,
        label: String,
    },
    ListMilestones {
        state: ItemState,
        per_page: u8,
    },
    ListPullRequests {
        state: ItemState,
        per_page: u8,
    },
    LabelPr {
        number: u64,
        labels: Vec<String>,
    },
    RequestReview {
        number: u64,
        reviewers: Vec<String>,
    },
    MergePr {
        number: u64,
        method: MergeMethod,
        require_confirmation: bool,
    },
}

impl Operation {
    /// Name of the exposed tool this operation backs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListIssues { .. } => "list_issues",
            Operation::SearchIssues { .. } => "search_issues",
            Operation::CreateIssue { .. } => "create_issue",
            Operation::CommentOnIssue { .. } => "comment_on_issue",
            Operation::ListLabels { .. } => "list_labels",
            Operation::AddLabel { .. } => "add_label_to_issue",
            Operation::RemoveLabel { .. } => "remove_label_from_issue",
            Operation::ListMilestones { .. } => "list_milestones",
            Operation::ListPullRequests { .. } => "list_pull_requests",
            Operation::LabelPr { .. } => "label_pr",
            Operation::RequestReview { .. } => "request_review",
            Operation::MergePr { .. } => "merge_pr",
        }
    }

    /// Whether the operation mutates GitHub state and therefore needs a token.
    pub fn is_write(&self) -> bool {
        match self {
            Operation::ListIssues { .. }
            | Operation::SearchIssues { .. }
            | Operation::ListLabels { .. }
            | Operation::ListMilestones { .. }
            | Operation::ListPullRequests { .. } => false,
            Operation::CreateIssue { .. }
            | Operation::CommentOnIssue { .. }
            | Operation::AddLabel { .. }
            | Operation::RemoveLabel { .. }
            | Operation::LabelPr { .. }
            | Operation::RequestReview { .. }
            | Operation::MergePr { .. } => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub repo: RepoRef,
    pub operation: Operation,
}

impl OperationRequest {
    pub fn new(repo: RepoRef, operation: Operation) -> Self {
        Self { repo, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_key_is_case_folded() {
        let repo = RepoRef::new("OctoCat", "Hello-World");
        assert_eq!(repo.full_name(), "OctoCat/Hello-World");
        assert_eq!(repo.allow_key(), "octocat/hello-world");
        assert_eq!(repo.to_string(), "OctoCat/Hello-World");
    }

    #[test]
    fn test_write_classification() {
        let reads = [
            Operation::ListIssues {
                state: ItemState::Open,
                per_page: 20,
            },
            Operation::SearchIssues {
                query: "crash".to_string(),
                per_page: 10,
            },
            Operation::ListLabels { per_page: 100 },
            Operation::ListMilestones {
                state: ItemState::All,
                per_page: 100,
            },
            Operation::ListPullRequests {
                state: ItemState::Closed,
                per_page: 20,
            },
        ];
        for op in &reads {
            assert!(!op.is_write(), "{} should be read-only", op.name());
        }

        let writes = [
            Operation::CreateIssue {
                title: "Crash on start".to_string(),
                body: "Steps to reproduce".to_string(),
            },
            Operation::CommentOnIssue {
                issue_number: 1,
                body: "+1".to_string(),
            },
            Operation::AddLabel {
                issue_number: 1,
                labels: vec!["bug".to_string()],
            },
            Operation::RemoveLabel {
                issue_number: 1,
                label: "bug".to_string(),
            },
            Operation::LabelPr {
                number: 2,
                labels: vec!["bug".to_string()],
            },
            Operation::RequestReview {
                number: 2,
                reviewers: vec!["octocat".to_string()],
            },
            Operation::MergePr {
                number: 2,
                method: MergeMethod::Squash,
                require_confirmation: true,
            },
        ];
        for op in &writes {
            assert!(op.is_write(), "{} should be a write", op.name());
        }
    }

    #[test]
    fn test_item_state_parse() {
        assert_eq!(ItemState::parse("open"), Some(ItemState::Open));
        assert_eq!(ItemState::parse("closed"), Some(ItemState::Closed));
        assert_eq!(ItemState::parse("all"), Some(ItemState::All));
        assert_eq!(ItemState::parse("OPEN"), None);
        assert_eq!(ItemState::default().as_str(), "open");
    }

    #[test]
    fn test_merge_method_serde() {
        let method: MergeMethod = serde_json::from_str("\"rebase\"").unwrap();
        assert_eq!(method, MergeMethod::Rebase);
        assert_eq!(MergeMethod::default().as_str(), "squash");
        assert!(serde_json::from_str::<MergeMethod>("\"fast-forward\"").is_err());
    }
}

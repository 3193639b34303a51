use std::path::PathBuf;

use rmcp::model::{CallToolResult, Content, ErrorData};
use serde::Serialize;

use crate::operation::RepoRef;

pub const RATE_LIMIT_HINT: &str = "Rate limit exceeded. Please retry later.";
pub const GENERIC_HINT: &str = "Check your token permissions and repository access.";

/// Classification of a failed operation, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Repository is not in the allowlist.
    Forbidden,
    /// Write attempted without a GitHub token.
    Unauthorized,
    /// GitHub reported an exhausted rate-limit quota.
    RateLimited,
    /// Any other upstream failure.
    GithubApiError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::GithubApiError => "github_api_error",
        }
    }
}

/// Structured failure returned to the caller in place of a raw error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ErrorDescriptor {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorDescriptor {
    pub fn forbidden(repo: &RepoRef) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            message: format!("Repository {} is not in the allowlist", repo.full_name()),
            status: None,
            hint: Some(format!(
                "Add \"{}\" to the allowedRepos list in the allowlist config and restart the server.",
                repo.allow_key()
            )),
        }
    }

    pub fn unauthorized(operation: &str) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            message: format!("GITHUB_TOKEN required for {}", operation),
            status: None,
            hint: Some(
                "Set the GITHUB_TOKEN environment variable (or pass --token) to enable write operations."
                    .to_string(),
            ),
        }
    }

    pub fn rate_limited(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            status: Some(status),
            hint: Some(RATE_LIMIT_HINT.to_string()),
        }
    }

    pub fn github_api(status: Option<u16>, message: impl Into<String>, hint: &str) -> Self {
        Self {
            kind: ErrorKind::GithubApiError,
            message: message.into(),
            status,
            hint: Some(hint.to_string()),
        }
    }

    /// The `{"error": {...}}` envelope relayed to protocol clients.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }

    pub fn to_call_result(&self) -> CallToolResult {
        let text = serde_json::to_string_pretty(&self.to_json())
            .unwrap_or_else(|_| self.message.clone());
        CallToolResult::error(vec![Content::text(text)])
    }

    pub fn to_mcp_error(&self) -> ErrorData {
        match self.kind {
            ErrorKind::Forbidden | ErrorKind::Unauthorized => {
                ErrorData::invalid_params(self.message.clone(), Some(self.to_json()))
            }
            ErrorKind::RateLimited | ErrorKind::GithubApiError => {
                ErrorData::internal_error(self.message.clone(), Some(self.to_json()))
            }
        }
    }
}

/// Failures below the HTTP status level: the request never produced a
/// usable response.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("GitHub request failed: {0}")]
    Transport(#[from] octocrab::Error),

    #[error("Unexpected GitHub response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<UpstreamError> for ErrorDescriptor {
    fn from(err: UpstreamError) -> Self {
        ErrorDescriptor::github_api(None, err.to_string(), GENERIC_HINT)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid allowlist config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rejections raised by the protocol front-end before the mediator runs.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

impl GateError {
    pub fn to_mcp_error(&self) -> ErrorData {
        match self {
            GateError::InvalidParam(_) => ErrorData::invalid_params(self.to_string(), None),
            GateError::UnknownResource(uri) => ErrorData::resource_not_found(
                self.to_string(),
                Some(serde_json::json!({ "uri": uri })),
            ),
        }
    }
}

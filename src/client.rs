//! GitHub REST client used by the access mediator.
//!
//! Every operation goes through one routine: build an [`UpstreamRequest`],
//! send it over a [`Transport`], and classify any non-success status into an
//! [`ErrorDescriptor`] using the operation's [`Hints`] table. Calls are
//! single-shot: no retry, no backoff, no pagination.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderName, ACCEPT};
use octocrab::service::middleware::retry::RetryConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Credential;
use crate::error::{ErrorDescriptor, UpstreamError, GENERIC_HINT};
use crate::operation::{ItemState, MergeMethod, RepoRef};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";
pub const ACCEPT_MEDIA_TYPE: &str = "application/vnd.github+json";

const API_VERSION_HEADER: &str = "x-github-api-version";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Headers attached to every upstream request. Auth is added separately, and
/// octocrab always sends its own fixed `user-agent: octocrab`.
pub fn standard_headers() -> Vec<(HeaderName, &'static str)> {
    vec![
        (ACCEPT, ACCEPT_MEDIA_TYPE),
        (HeaderName::from_static(API_VERSION_HEADER), API_VERSION),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path and query relative to the API base, e.g. `/repos/o/r/issues?state=open`.
    pub route: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub rate_limit_remaining: Option<String>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one HTTP request to GitHub and reports the raw outcome. Non-2xx
/// statuses are returned as responses, not errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// [`Transport`] backed by octocrab's raw request methods.
pub struct OctocrabTransport {
    github: octocrab::Octocrab,
}

impl OctocrabTransport {
    pub fn new(github: octocrab::Octocrab) -> Self {
        Self { github }
    }

    /// Build an octocrab client against `api_url` with the standard header set
    /// and, when present, bearer authentication. Retries are off: every call
    /// reaches GitHub exactly once.
    pub fn connect(api_url: &str, credential: Option<&Credential>) -> Result<Self, UpstreamError> {
        let mut builder = octocrab::OctocrabBuilder::new()
            .add_retry_config(RetryConfig::None)
            .base_uri(api_url)?;
        for (name, value) in standard_headers() {
            builder = builder.add_header(name, value.to_string());
        }
        if let Some(credential) = credential {
            builder = builder.personal_token(credential.expose().to_string());
        }
        Ok(Self::new(builder.build()?))
    }
}

#[async_trait]
impl Transport for OctocrabTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let route = request.route.as_str();
        let body = request.body.as_ref();
        let response = match request.method {
            Method::Get => self.github._get(route).await?,
            Method::Post => self.github._post(route, body).await?,
            Method::Put => self.github._put(route, body).await?,
            Method::Delete => self.github._delete(route, body).await?,
        };

        let status = response.status().as_u16();
        let rate_limit_remaining = response
            .headers()
            .get(RATE_LIMIT_REMAINING_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = self.github.body_to_string(response).await?;

        Ok(UpstreamResponse {
            status,
            rate_limit_remaining,
            body,
        })
    }
}

/// Per-operation remediation hints keyed by upstream status.
#[derive(Debug)]
pub struct Hints {
    /// 403 without rate-limit exhaustion.
    pub forbidden: &'static str,
    pub not_found: Option<&'static str>,
    pub unprocessable: Option<&'static str>,
    pub other: &'static [(u16, &'static str)],
}

const REPO_NOT_FOUND: &str = "Repository not found or access denied.";
const ISSUE_NOT_FOUND: &str = "Issue not found or access denied.";
const PR_NOT_FOUND: &str = "Pull request not found or access denied.";
const READ_DENIED: &str = "Access denied. Check repository permissions.";
const WRITE_DENIED: &str = "Access denied. Check repository permissions and token scopes.";
const INVALID_LABEL: &str = "Invalid label name or label does not exist in repository.";

pub const REPO_READ_HINTS: Hints = Hints {
    forbidden: READ_DENIED,
    not_found: Some(REPO_NOT_FOUND),
    unprocessable: None,
    other: &[],
};

pub const SEARCH_HINTS: Hints = Hints {
    forbidden: "Search access denied. Check repository permissions.",
    not_found: None,
    unprocessable: Some("Invalid search query. Try adding 'is:issue' or 'is:pr' qualifiers."),
    other: &[],
};

pub const CREATE_ISSUE_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(REPO_NOT_FOUND),
    unprocessable: None,
    other: &[],
};

pub const ISSUE_WRITE_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(ISSUE_NOT_FOUND),
    unprocessable: None,
    other: &[],
};

pub const ISSUE_LABEL_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(ISSUE_NOT_FOUND),
    unprocessable: Some(INVALID_LABEL),
    other: &[],
};

pub const PR_LABEL_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(PR_NOT_FOUND),
    unprocessable: Some(INVALID_LABEL),
    other: &[],
};

pub const REVIEW_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(PR_NOT_FOUND),
    unprocessable: Some("Invalid reviewer username or user is not a collaborator."),
    other: &[],
};

pub const MERGE_HINTS: Hints = Hints {
    forbidden: WRITE_DENIED,
    not_found: Some(PR_NOT_FOUND),
    unprocessable: None,
    other: &[
        (405, "Pull request cannot be merged. Check merge requirements."),
        (409, "Merge conflict detected. Resolve conflicts before merging."),
    ],
};

/// Turn a non-success response into an [`ErrorDescriptor`].
///
/// 403 is `rate_limited` only when GitHub reports zero remaining requests;
/// every other status is `github_api_error` carrying the raw body.
pub fn classify(operation: &str, response: &UpstreamResponse, hints: &Hints) -> ErrorDescriptor {
    let status = response.status;
    let message = format!(
        "GitHub {} failed: {} {}",
        operation,
        status,
        response.body.trim()
    );

    let hint = match status {
        403 if response.rate_limit_remaining.as_deref() == Some("0") => {
            return ErrorDescriptor::rate_limited(status, message);
        }
        403 => hints.forbidden,
        404 => hints.not_found.unwrap_or(GENERIC_HINT),
        422 => hints.unprocessable.unwrap_or(GENERIC_HINT),
        _ => hints
            .other
            .iter()
            .find(|(code, _)| *code == status)
            .map(|(_, hint)| *hint)
            .unwrap_or(GENERIC_HINT),
    };
    ErrorDescriptor::github_api(Some(status), message, hint)
}

// -- Response payloads (only the fields the mediator reports) --

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub total_count: u64,
    pub items: Vec<Issue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub open_issues: u64,
    #[serde(default)]
    pub closed_issues: u64,
    #[serde(default)]
    pub due_on: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<Account>,
    pub head: BranchRef,
    pub base: BranchRef,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub requested_reviewers: Vec<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeOutcome {
    #[serde(default)]
    pub sha: Option<String>,
    pub merged: bool,
    #[serde(default)]
    pub message: String,
}

/// Whether `remove_label` actually detached the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRemoval {
    Removed,
    AlreadyAbsent,
}

struct Call {
    operation: &'static str,
    write: bool,
    method: Method,
    route: String,
    body: Option<serde_json::Value>,
    hints: &'static Hints,
}

/// Typed GitHub operations over a [`Transport`].
#[derive(Clone)]
pub struct GithubClient {
    transport: Arc<dyn Transport>,
    authenticated: bool,
}

impl GithubClient {
    pub fn new(transport: Arc<dyn Transport>, authenticated: bool) -> Self {
        Self {
            transport,
            authenticated,
        }
    }

    /// Send a call, stopping before the network if a write lacks a token.
    async fn send(&self, call: &Call) -> Result<UpstreamResponse, ErrorDescriptor> {
        if call.write && !self.authenticated {
            return Err(ErrorDescriptor::unauthorized(call.operation));
        }

        let response = self
            .transport
            .send(UpstreamRequest {
                method: call.method,
                route: call.route.clone(),
                body: call.body.clone(),
            })
            .await?;

        if !response.is_success() {
            tracing::debug!(
                operation = call.operation,
                status = response.status,
                "GitHub returned non-success status"
            );
        }
        Ok(response)
    }

    async fn execute<T: DeserializeOwned>(&self, call: Call) -> Result<T, ErrorDescriptor> {
        let response = self.send(&call).await?;
        if !response.is_success() {
            return Err(classify(call.operation, &response, call.hints));
        }
        let payload = serde_json::from_str(&response.body).map_err(UpstreamError::from)?;
        Ok(payload)
    }

    pub async fn list_issues(
        &self,
        repo: &RepoRef,
        state: ItemState,
        per_page: u8,
    ) -> Result<Vec<Issue>, ErrorDescriptor> {
        self.execute(Call {
            operation: "listIssues",
            write: false,
            method: Method::Get,
            route: repo_route(
                repo,
                "issues",
                &[("state", state.as_str()), ("per_page", &per_page.to_string())],
            ),
            body: None,
            hints: &REPO_READ_HINTS,
        })
        .await
    }

    pub async fn search_issues(
        &self,
        repo: &RepoRef,
        query: &str,
        per_page: u8,
    ) -> Result<SearchResults, ErrorDescriptor> {
        let q = format!("repo:{} is:issue {}", repo.full_name(), query);
        self.execute(Call {
            operation: "searchIssues",
            write: false,
            method: Method::Get,
            route: with_query(
                "/search/issues".to_string(),
                &[("q", &q), ("per_page", &per_page.to_string())],
            ),
            body: None,
            hints: &SEARCH_HINTS,
        })
        .await
    }

    pub async fn create_issue(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
    ) -> Result<Issue, ErrorDescriptor> {
        self.execute(Call {
            operation: "createIssue",
            write: true,
            method: Method::Post,
            route: repo_route(repo, "issues", &[]),
            body: Some(serde_json::json!({ "title": title, "body": body })),
            hints: &CREATE_ISSUE_HINTS,
        })
        .await
    }

    pub async fn comment_on_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<Comment, ErrorDescriptor> {
        self.execute(Call {
            operation: "commentOnIssue",
            write: true,
            method: Method::Post,
            route: repo_route(repo, &format!("issues/{}/comments", issue_number), &[]),
            body: Some(serde_json::json!({ "body": body })),
            hints: &ISSUE_WRITE_HINTS,
        })
        .await
    }

    pub async fn list_labels(
        &self,
        repo: &RepoRef,
        per_page: u8,
    ) -> Result<Vec<Label>, ErrorDescriptor> {
        self.execute(Call {
            operation: "listLabels",
            write: false,
            method: Method::Get,
            route: repo_route(repo, "labels", &[("per_page", &per_page.to_string())]),
            body: None,
            hints: &REPO_READ_HINTS,
        })
        .await
    }

    /// Add labels to an issue; returns the issue's full label set afterwards.
    pub async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>, ErrorDescriptor> {
        self.execute(Call {
            operation: "addLabelToIssue",
            write: true,
            method: Method::Post,
            route: repo_route(repo, &format!("issues/{}/labels", issue_number), &[]),
            body: Some(serde_json::json!({ "labels": labels })),
            hints: &ISSUE_LABEL_HINTS,
        })
        .await
    }

    /// Remove one label. A 404 means the label was not on the issue and is
    /// reported as [`LabelRemoval::AlreadyAbsent`], not as an error.
    pub async fn remove_label_from_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        label: &str,
    ) -> Result<LabelRemoval, ErrorDescriptor> {
        let call = Call {
            operation: "removeLabelFromIssue",
            write: true,
            method: Method::Delete,
            route: repo_route(
                repo,
                &format!("issues/{}/labels/{}", issue_number, encode_segment(label)),
                &[],
            ),
            body: None,
            hints: &ISSUE_WRITE_HINTS,
        };
        let response = self.send(&call).await?;
        match response.status {
            404 => Ok(LabelRemoval::AlreadyAbsent),
            _ if response.is_success() => Ok(LabelRemoval::Removed),
            _ => Err(classify(call.operation, &response, call.hints)),
        }
    }

    pub async fn list_milestones(
        &self,
        repo: &RepoRef,
        state: ItemState,
        per_page: u8,
    ) -> Result<Vec<Milestone>, ErrorDescriptor> {
        self.execute(Call {
            operation: "listMilestones",
            write: false,
            method: Method::Get,
            route: repo_route(
                repo,
                "milestones",
                &[("state", state.as_str()), ("per_page", &per_page.to_string())],
            ),
            body: None,
            hints: &REPO_READ_HINTS,
        })
        .await
    }

    pub async fn list_pull_requests(
        &self,
        repo: &RepoRef,
        state: ItemState,
        per_page: u8,
    ) -> Result<Vec<PullRequest>, ErrorDescriptor> {
        self.execute(Call {
            operation: "listPullRequests",
            write: false,
            method: Method::Get,
            route: repo_route(
                repo,
                "pulls",
                &[("state", state.as_str()), ("per_page", &per_page.to_string())],
            ),
            body: None,
            hints: &REPO_READ_HINTS,
        })
        .await
    }

    /// Pull requests share the issue label endpoint.
    pub async fn label_pr(
        &self,
        repo: &RepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>, ErrorDescriptor> {
        self.execute(Call {
            operation: "labelPR",
            write: true,
            method: Method::Post,
            route: repo_route(repo, &format!("issues/{}/labels", number), &[]),
            body: Some(serde_json::json!({ "labels": labels })),
            hints: &PR_LABEL_HINTS,
        })
        .await
    }

    pub async fn request_review(
        &self,
        repo: &RepoRef,
        number: u64,
        reviewers: &[String],
    ) -> Result<PullRequest, ErrorDescriptor> {
        self.execute(Call {
            operation: "requestReview",
            write: true,
            method: Method::Post,
            route: repo_route(repo, &format!("pulls/{}/requested_reviewers", number), &[]),
            body: Some(serde_json::json!({ "reviewers": reviewers })),
            hints: &REVIEW_HINTS,
        })
        .await
    }

    pub async fn merge_pr(
        &self,
        repo: &RepoRef,
        number: u64,
        method: MergeMethod,
    ) -> Result<MergeOutcome, ErrorDescriptor> {
        self.execute(Call {
            operation: "mergePR",
            write: true,
            method: Method::Put,
            route: repo_route(repo, &format!("pulls/{}/merge", number), &[]),
            body: Some(serde_json::json!({ "merge_method": method.as_str() })),
            hints: &MERGE_HINTS,
        })
        .await
    }
}

/// Percent-encode a single path segment (spaces become `%20`, not `+`).
fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn repo_route(repo: &RepoRef, tail: &str, query: &[(&str, &str)]) -> String {
    let path = format!(
        "/repos/{}/{}/{}",
        encode_segment(&repo.owner),
        encode_segment(&repo.repo),
        tail
    );
    with_query(path, query)
}

fn with_query(path: String, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path;
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    format!("{}?{}", path, encoded)
}

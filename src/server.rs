use std::sync::Arc;

use rmcp::handler::server::router::prompt::PromptRouter;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{
    prompt, prompt_handler, prompt_router, schemars, tool, tool_handler, tool_router, RoleServer,
    ServerHandler,
};
use serde::Deserialize;

use crate::error::GateError;
use crate::mediator::{AccessMediator, Listing};
use crate::operation::{ItemState, MergeMethod, Operation, OperationRequest, RepoRef};

pub const ISSUES_RESOURCE_TEMPLATE: &str = "github://repos/{owner}/{repo}/issues?state={state}";
pub const LABELS_RESOURCE_TEMPLATE: &str = "github://repos/{owner}/{repo}/labels";
pub const PULLS_RESOURCE_TEMPLATE: &str = "github://repos/{owner}/{repo}/pulls?state={state}";

const MARKDOWN_MIME: &str = "text/markdown";

const MAX_QUERY_CHARS: usize = 256;
const MAX_BODY_CHARS: usize = 5000;
const MAX_LABELS: usize = 10;
const MAX_LABEL_CHARS: usize = 50;
const MAX_REVIEWERS: usize = 10;
const MAX_LOGIN_CHARS: usize = 39;

#[derive(Clone)]
pub struct GithubGateServer {
    mediator: Arc<AccessMediator>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

/// Tool input that the front-end checks against its declared bounds before
/// handing it to the mediator.
pub trait ToolInput {
    fn into_request(self) -> Result<OperationRequest, GateError>;
}

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListIssuesParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Filter by state: open, closed, or all (default: open)")]
    #[serde(default)]
    pub state: Option<ItemState>,

    #[schemars(description = "Maximum number of results (1-100, default 20)")]
    #[schemars(range(min = 1, max = 100))]
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchIssuesParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(
        description = "Search text (2-256 characters); automatically scoped to the repository's issues"
    )]
    #[schemars(length(min = 2, max = 256))]
    pub query: String,

    #[schemars(description = "Maximum number of results (1-50, default 10)")]
    #[schemars(range(min = 1, max = 50))]
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateIssueParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue title (5-120 characters)")]
    #[schemars(length(min = 5, max = 120))]
    pub title: String,

    #[schemars(description = "Issue body in markdown (10-5000 characters)")]
    #[schemars(length(min = 10, max = 5000))]
    pub body: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CommentOnIssueParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    #[schemars(range(min = 1))]
    pub issue_number: u64,

    #[schemars(description = "Comment body in markdown (1-5000 characters)")]
    #[schemars(length(min = 1, max = 5000))]
    pub body: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListLabelsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Maximum number of results (1-100, default 100)")]
    #[schemars(range(min = 1, max = 100))]
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddLabelParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    #[schemars(range(min = 1))]
    pub issue_number: u64,

    #[schemars(description = "Label names to add (1-10 labels, each at most 50 characters)")]
    #[schemars(length(min = 1, max = 10))]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveLabelParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    #[schemars(range(min = 1))]
    pub issue_number: u64,

    #[schemars(description = "Label to remove (at most 50 characters)")]
    #[schemars(length(min = 1, max = 50))]
    pub label_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListMilestonesParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Filter by state: open, closed, or all (default: open)")]
    #[serde(default)]
    pub state: Option<ItemState>,

    #[schemars(description = "Maximum number of results (1-100, default 100)")]
    #[schemars(range(min = 1, max = 100))]
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListPullRequestsParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Filter by state: open, closed, or all (default: open)")]
    #[serde(default)]
    pub state: Option<ItemState>,

    #[schemars(description = "Maximum number of results (1-100, default 20)")]
    #[schemars(range(min = 1, max = 100))]
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LabelPrParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Pull request number")]
    #[schemars(range(min = 1))]
    pub number: u64,

    #[schemars(description = "Label names to add (1-10 labels, each at most 50 characters)")]
    #[schemars(length(min = 1, max = 10))]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RequestReviewParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Pull request number")]
    #[schemars(range(min = 1))]
    pub number: u64,

    #[schemars(description = "GitHub usernames to request (1-10, each at most 39 characters)")]
    #[schemars(length(min = 1, max = 10))]
    pub reviewers: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct MergePrParams {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Pull request number")]
    #[schemars(range(min = 1))]
    pub number: u64,

    #[schemars(description = "Merge method: squash, merge, or rebase (default: squash)")]
    #[serde(default)]
    pub method: MergeMethod,

    #[schemars(
        description = "When true (default), only describe the merge; call again with false to actually merge"
    )]
    #[serde(default = "default_true")]
    pub require_confirmation: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TriageIssueArgs {
    #[schemars(description = "Repository owner (user or org)")]
    pub owner: String,

    #[schemars(description = "Repository name")]
    pub repo: String,
}

// -- Bound checks --

/// Validate that a GitHub owner/repo name doesn't contain characters that
/// could be used for URL injection in API routes.
fn sanitize_github_name(name: &str, field: &str) -> Result<(), GateError> {
    if name.is_empty() {
        return Err(GateError::InvalidParam(format!(
            "{} must not be empty",
            field
        )));
    }
    for ch in ['/', '?', '#', '%', '\0', ' ', '\n', '\t'] {
        if name.contains(ch) {
            return Err(GateError::InvalidParam(format!(
                "{} contains invalid character '{}'",
                field,
                ch.escape_default()
            )));
        }
    }
    Ok(())
}

fn repo_ref(owner: &str, repo: &str) -> Result<RepoRef, GateError> {
    sanitize_github_name(owner, "owner")?;
    sanitize_github_name(repo, "repo")?;
    Ok(RepoRef::new(owner, repo))
}

/// Character-count bounds, inclusive.
fn check_length(value: &str, field: &str, min: usize, max: usize) -> Result<(), GateError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(GateError::InvalidParam(format!(
            "{} must be between {} and {} characters (got {})",
            field, min, max, len
        )));
    }
    Ok(())
}

fn check_positive(value: u64, field: &str) -> Result<u64, GateError> {
    if value == 0 {
        return Err(GateError::InvalidParam(format!(
            "{} must be a positive integer",
            field
        )));
    }
    Ok(value)
}

fn per_page(value: Option<u32>, default: u8, max: u8) -> Result<u8, GateError> {
    match value {
        None => Ok(default),
        Some(n) if (1..=u32::from(max)).contains(&n) => Ok(n as u8),
        Some(n) => Err(GateError::InvalidParam(format!(
            "per_page must be between 1 and {} (got {})",
            max, n
        ))),
    }
}

fn check_names(
    items: &[String],
    field: &str,
    max_items: usize,
    max_chars: usize,
) -> Result<(), GateError> {
    if items.is_empty() || items.len() > max_items {
        return Err(GateError::InvalidParam(format!(
            "{} must contain between 1 and {} entries (got {})",
            field,
            max_items,
            items.len()
        )));
    }
    for item in items {
        check_length(item, field, 1, max_chars)?;
    }
    Ok(())
}

impl ToolInput for ListIssuesParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        Ok(OperationRequest::new(
            repo_ref(&self.owner, &self.repo)?,
            Operation::ListIssues {
                state: self.state.unwrap_or_default(),
                per_page: per_page(self.per_page, 20, 100)?,
            },
        ))
    }
}

impl ToolInput for SearchIssuesParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_length(&self.query, "query", 2, MAX_QUERY_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::SearchIssues {
                query: self.query,
                per_page: per_page(self.per_page, 10, 50)?,
            },
        ))
    }
}

impl ToolInput for CreateIssueParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_length(&self.title, "title", 5, 120)?;
        check_length(&self.body, "body", 10, MAX_BODY_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::CreateIssue {
                title: self.title,
                body: self.body,
            },
        ))
    }
}

impl ToolInput for CommentOnIssueParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_length(&self.body, "body", 1, MAX_BODY_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::CommentOnIssue {
                issue_number: check_positive(self.issue_number, "issue_number")?,
                body: self.body,
            },
        ))
    }
}

impl ToolInput for ListLabelsParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        Ok(OperationRequest::new(
            repo_ref(&self.owner, &self.repo)?,
            Operation::ListLabels {
                per_page: per_page(self.per_page, 100, 100)?,
            },
        ))
    }
}

impl ToolInput for AddLabelParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_names(&self.labels, "labels", MAX_LABELS, MAX_LABEL_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::AddLabel {
                issue_number: check_positive(self.issue_number, "issue_number")?,
                labels: self.labels,
            },
        ))
    }
}

impl ToolInput for RemoveLabelParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_length(&self.label_name, "label_name", 1, MAX_LABEL_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::RemoveLabel {
                issue_number: check_positive(self.issue_number, "issue_number")?,
                label: self.label_name,
            },
        ))
    }
}

impl ToolInput for ListMilestonesParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        Ok(OperationRequest::new(
            repo_ref(&self.owner, &self.repo)?,
            Operation::ListMilestones {
                state: self.state.unwrap_or_default(),
                per_page: per_page(self.per_page, 100, 100)?,
            },
        ))
    }
}

impl ToolInput for ListPullRequestsParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        Ok(OperationRequest::new(
            repo_ref(&self.owner, &self.repo)?,
            Operation::ListPullRequests {
                state: self.state.unwrap_or_default(),
                per_page: per_page(self.per_page, 20, 100)?,
            },
        ))
    }
}

impl ToolInput for LabelPrParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_names(&self.labels, "labels", MAX_LABELS, MAX_LABEL_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::LabelPr {
                number: check_positive(self.number, "number")?,
                labels: self.labels,
            },
        ))
    }
}

impl ToolInput for RequestReviewParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        let repo = repo_ref(&self.owner, &self.repo)?;
        check_names(&self.reviewers, "reviewers", MAX_REVIEWERS, MAX_LOGIN_CHARS)?;
        Ok(OperationRequest::new(
            repo,
            Operation::RequestReview {
                number: check_positive(self.number, "number")?,
                reviewers: self.reviewers,
            },
        ))
    }
}

impl ToolInput for MergePrParams {
    fn into_request(self) -> Result<OperationRequest, GateError> {
        Ok(OperationRequest::new(
            repo_ref(&self.owner, &self.repo)?,
            Operation::MergePr {
                number: check_positive(self.number, "number")?,
                method: self.method,
                require_confirmation: self.require_confirmation,
            },
        ))
    }
}

/// A parsed `github://repos/...` resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub listing: Listing,
    pub repo: RepoRef,
    pub state: ItemState,
}

/// Parse a resource URI produced from one of the resource templates.
/// A missing or blank `state` means `open`.
pub fn parse_resource_uri(uri: &str) -> Result<ResourceRequest, GateError> {
    let unknown = || GateError::UnknownResource(uri.to_string());
    let parsed = url::Url::parse(uri).map_err(|_| unknown())?;
    if parsed.scheme() != "github" || parsed.host_str() != Some("repos") {
        return Err(unknown());
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    let (owner, repo, kind) = match segments.as_slice() {
        [owner, repo, kind] => (*owner, *repo, *kind),
        _ => return Err(unknown()),
    };
    let listing = match kind {
        "issues" => Listing::Issues,
        "labels" => Listing::Labels,
        "pulls" => Listing::PullRequests,
        _ => return Err(unknown()),
    };

    let state = match parsed.query_pairs().find(|(key, _)| key == "state") {
        Some((_, value)) if !value.is_empty() => ItemState::parse(&value).ok_or_else(|| {
            GateError::InvalidParam(format!(
                "state must be open, closed, or all (got '{}')",
                value
            ))
        })?,
        _ => ItemState::Open,
    };

    Ok(ResourceRequest {
        listing,
        repo: repo_ref(owner, repo)?,
        state,
    })
}

fn resource_templates() -> Vec<ResourceTemplate> {
    [
        (
            ISSUES_RESOURCE_TEMPLATE,
            "repo-issues",
            "GitHub Issues",
            "List issues for an allowlisted repository as markdown.",
        ),
        (
            LABELS_RESOURCE_TEMPLATE,
            "repo-labels",
            "GitHub Labels",
            "List labels defined in an allowlisted repository as markdown.",
        ),
        (
            PULLS_RESOURCE_TEMPLATE,
            "repo-pulls",
            "GitHub Pull Requests",
            "List pull requests for an allowlisted repository as markdown.",
        ),
    ]
    .into_iter()
    .map(|(uri_template, name, title, description)| {
        RawResourceTemplate {
            uri_template: uri_template.to_string(),
            name: name.to_string(),
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            mime_type: Some(MARKDOWN_MIME.to_string()),
            icons: None,
        }
        .no_annotation()
    })
    .collect()
}

fn markdown_contents(text: String, uri: String) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri,
        mime_type: Some(MARKDOWN_MIME.to_string()),
        text,
        meta: None,
    }
}

fn triage_issue_messages(owner: &str, repo: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "You are helping triage bugs for {owner}/{repo}. Only call the tool create_issue if:\n\
                 - The report is reproducible OR clearly actionable, and\n\
                 - It is not a duplicate based on recent open issues returned by the \
                 github://repos/{owner}/{repo}/issues resource or the search_issues tool.\n\
                 If uncertain, ask clarifying questions instead of creating an issue."
            ),
        ),
        PromptMessage::new_text(
            PromptMessageRole::User,
            "Provide the user complaint and evidence here.",
        ),
    ]
}

impl GithubGateServer {
    pub fn new(mediator: AccessMediator) -> Self {
        Self {
            mediator: Arc::new(mediator),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    fn err(&self, e: GateError) -> ErrorData {
        e.to_mcp_error()
    }

    /// Validate, mediate, and wrap the outcome. Mediation failures become
    /// error-flagged tool results rather than protocol errors.
    async fn run<P: ToolInput>(&self, params: P) -> Result<CallToolResult, ErrorData> {
        let request = params.into_request().map_err(|e| self.err(e))?;
        Ok(match self.mediator.execute(request).await {
            Ok(text) => CallToolResult::success(vec![Content::text(text)]),
            Err(descriptor) => descriptor.to_call_result(),
        })
    }
}

// -- MCP tool handlers --

#[tool_router]
impl GithubGateServer {
    #[tool(
        name = "list_issues",
        description = "List issues in an allowlisted repository, filtered by state"
    )]
    async fn list_issues(
        &self,
        Parameters(params): Parameters<ListIssuesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "search_issues",
        description = "Full-text search within a repository's issues"
    )]
    async fn search_issues(
        &self,
        Parameters(params): Parameters<SearchIssuesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "create_issue",
        description = "Create a new issue in a repository. Use only when confident and authorized."
    )]
    async fn create_issue(
        &self,
        Parameters(params): Parameters<CreateIssueParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "comment_on_issue",
        description = "Add a comment to an existing issue"
    )]
    async fn comment_on_issue(
        &self,
        Parameters(params): Parameters<CommentOnIssueParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "list_labels",
        description = "List labels defined in a repository"
    )]
    async fn list_labels(
        &self,
        Parameters(params): Parameters<ListLabelsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "add_label_to_issue",
        description = "Add one or more existing labels to an issue"
    )]
    async fn add_label_to_issue(
        &self,
        Parameters(params): Parameters<AddLabelParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "remove_label_from_issue",
        description = "Remove a label from an issue. Succeeds if the label is already absent."
    )]
    async fn remove_label_from_issue(
        &self,
        Parameters(params): Parameters<RemoveLabelParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "list_milestones",
        description = "List milestones in a repository with progress and due dates"
    )]
    async fn list_milestones(
        &self,
        Parameters(params): Parameters<ListMilestonesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "list_pull_requests",
        description = "List pull requests in a repository, filtered by state"
    )]
    async fn list_pull_requests(
        &self,
        Parameters(params): Parameters<ListPullRequestsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "label_pr",
        description = "Add one or more existing labels to a pull request"
    )]
    async fn label_pr(
        &self,
        Parameters(params): Parameters<LabelPrParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "request_review",
        description = "Request reviews on a pull request from one or more users"
    )]
    async fn request_review(
        &self,
        Parameters(params): Parameters<RequestReviewParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }

    #[tool(
        name = "merge_pr",
        description = "Merge a pull request. The first call only asks for confirmation; \
                       call again with require_confirmation=false to merge."
    )]
    async fn merge_pr(
        &self,
        Parameters(params): Parameters<MergePrParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run(params).await
    }
}

#[prompt_router]
impl GithubGateServer {
    #[prompt(
        name = "triage_issue",
        description = "Guide the model to safely decide whether to file a GitHub issue"
    )]
    async fn triage_issue(
        &self,
        Parameters(args): Parameters<TriageIssueArgs>,
    ) -> Result<Vec<PromptMessage>, ErrorData> {
        repo_ref(&args.owner, &args.repo).map_err(|e| self.err(e))?;
        Ok(triage_issue_messages(&args.owner, &args.repo))
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for GithubGateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "mcp-github-gate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "GitHub server restricted to an allowlist of repositories. Read with \
                 list_issues, search_issues, list_labels, list_milestones and \
                 list_pull_requests, or the repo-issues/repo-labels/repo-pulls resources. \
                 Write with create_issue, comment_on_issue, add_label_to_issue, \
                 remove_label_from_issue, label_pr, request_review and merge_pr \
                 (requires a GitHub token). merge_pr asks for confirmation first. \
                 Failures come back as {\"error\": {type, message, status, hint}}."
                    .to_string(),
            ),
        }
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult::with_all_items(
            resource_templates(),
        ))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let resource = parse_resource_uri(&request.uri).map_err(|e| self.err(e))?;
        let markdown = self
            .mediator
            .render_listing(resource.listing, &resource.repo, resource.state)
            .await
            .map_err(|d| d.to_mcp_error())?;
        Ok(ReadResourceResult {
            contents: vec![markdown_contents(markdown, request.uri)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{gate_config, FakeTransport};

    fn make_server(transport: &Arc<FakeTransport>, with_token: bool) -> GithubGateServer {
        let config = Arc::new(gate_config(&["octocat/hello-world"], with_token));
        GithubGateServer::new(AccessMediator::new(config, transport.clone()))
    }

    fn result_text(result: &CallToolResult) -> String {
        serde_json::to_value(&result.content).unwrap()[0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn create_params(title: &str, body: &str) -> CreateIssueParams {
        CreateIssueParams {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_sanitize_github_name_valid() {
        assert!(sanitize_github_name("my-org", "owner").is_ok());
        assert!(sanitize_github_name("user_name", "owner").is_ok());
        assert!(sanitize_github_name("repo.name", "repo").is_ok());
    }

    #[test]
    fn test_sanitize_github_name_rejects_injection() {
        assert!(sanitize_github_name("", "owner").is_err());
        assert!(sanitize_github_name("owner/repo", "owner").is_err());
        assert!(sanitize_github_name("../etc", "owner").is_err());
        assert!(sanitize_github_name("owner?evil=1", "owner").is_err());
        assert!(sanitize_github_name("repo#fragment", "repo").is_err());
        assert!(sanitize_github_name("my repo", "repo").is_err());
        assert!(sanitize_github_name("my\nrepo", "repo").is_err());
    }

    #[test]
    fn test_create_issue_bounds() {
        assert!(create_params("Crash", "Steps to reproduce").into_request().is_ok());
        assert!(create_params("Bug", "Steps to reproduce").into_request().is_err());
        assert!(create_params(&"x".repeat(121), "Steps to reproduce")
            .into_request()
            .is_err());
        assert!(create_params("Crash on start", "too short").into_request().is_err());
        assert!(create_params("Crash on start", &"y".repeat(5001))
            .into_request()
            .is_err());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert!(check_length("ééééé", "title", 5, 5).is_ok());
    }

    #[test]
    fn test_per_page_defaults_and_bounds() {
        assert_eq!(per_page(None, 10, 50).unwrap(), 10);
        assert_eq!(per_page(Some(50), 10, 50).unwrap(), 50);
        assert!(per_page(Some(0), 10, 50).is_err());
        assert!(per_page(Some(51), 10, 50).is_err());
        assert!(per_page(Some(1000), 20, 100).is_err());
    }

    #[test]
    fn test_label_list_bounds() {
        let params = |labels: Vec<String>| AddLabelParams {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            issue_number: 1,
            labels,
        };
        assert!(params(vec!["bug".to_string()]).into_request().is_ok());
        assert!(params(vec![]).into_request().is_err());
        assert!(params(vec!["l".to_string(); 11]).into_request().is_err());
        assert!(params(vec!["x".repeat(51)]).into_request().is_err());
    }

    #[test]
    fn test_reviewer_bounds() {
        let params = |reviewers: Vec<String>| RequestReviewParams {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            number: 2,
            reviewers,
        };
        assert!(params(vec!["x".repeat(39)]).into_request().is_ok());
        assert!(params(vec!["x".repeat(40)]).into_request().is_err());
    }

    #[test]
    fn test_zero_issue_number_rejected() {
        let params = CommentOnIssueParams {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            issue_number: 0,
            body: "hi".to_string(),
        };
        assert!(params.into_request().is_err());
    }

    #[test]
    fn test_merge_params_default_to_confirmation() {
        let params: MergePrParams = serde_json::from_value(serde_json::json!({
            "owner": "octocat",
            "repo": "hello-world",
            "number": 5
        }))
        .unwrap();
        assert!(params.require_confirmation);
        assert_eq!(params.method, MergeMethod::Squash);
        match params.into_request().unwrap().operation {
            Operation::MergePr {
                require_confirmation,
                ..
            } => assert!(require_confirmation),
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_parse_resource_uri() {
        let r = parse_resource_uri("github://repos/octocat/hello-world/issues?state=closed").unwrap();
        assert_eq!(r.listing, Listing::Issues);
        assert_eq!(r.repo, RepoRef::new("octocat", "hello-world"));
        assert_eq!(r.state, ItemState::Closed);

        let r = parse_resource_uri("github://repos/octocat/hello-world/labels").unwrap();
        assert_eq!(r.listing, Listing::Labels);
        assert_eq!(r.state, ItemState::Open);

        let r = parse_resource_uri("github://repos/octocat/hello-world/pulls?state=").unwrap();
        assert_eq!(r.listing, Listing::PullRequests);
        assert_eq!(r.state, ItemState::Open);
    }

    #[test]
    fn test_parse_resource_uri_rejects_unknown() {
        assert!(matches!(
            parse_resource_uri("github://repos/octocat/hello-world/commits"),
            Err(GateError::UnknownResource(_))
        ));
        assert!(matches!(
            parse_resource_uri("https://repos/octocat/hello-world/issues"),
            Err(GateError::UnknownResource(_))
        ));
        assert!(matches!(
            parse_resource_uri("github://repos/octocat/issues"),
            Err(GateError::UnknownResource(_))
        ));
        assert!(matches!(
            parse_resource_uri("github://repos/octocat/hello-world/issues?state=merged"),
            Err(GateError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_resource_templates() {
        let templates = resource_templates();
        assert_eq!(templates.len(), 3);
        let json = serde_json::to_value(&templates).unwrap();
        assert_eq!(json[0]["uriTemplate"], ISSUES_RESOURCE_TEMPLATE);
        assert_eq!(json[1]["name"], "repo-labels");
        assert_eq!(json[2]["mimeType"], "text/markdown");
    }

    #[test]
    fn test_search_query_bounds() {
        let params = |query: String| SearchIssuesParams {
            owner: "octocat".to_string(),
            repo: "hello-world".to_string(),
            query,
            per_page: None,
        };
        assert!(params("x".repeat(256)).into_request().is_ok());
        assert!(params("x".repeat(257)).into_request().is_err());
        assert!(params("x".to_string()).into_request().is_err());

        let schema = serde_json::to_value(schemars::schema_for!(SearchIssuesParams)).unwrap();
        assert_eq!(schema["properties"]["query"]["minLength"], 2);
        assert_eq!(schema["properties"]["query"]["maxLength"], 256);
    }

    #[test]
    fn test_resource_contents_are_markdown() {
        let contents = markdown_contents(
            "## Issues".to_string(),
            "github://repos/octocat/hello-world/issues".to_string(),
        );
        let json = serde_json::to_value(&contents).unwrap();
        assert_eq!(json["mimeType"], "text/markdown");
        assert_eq!(json["uri"], "github://repos/octocat/hello-world/issues");
        assert_eq!(json["text"], "## Issues");
    }

    #[test]
    fn test_triage_prompt_mentions_repo() {
        let messages = triage_issue_messages("octocat", "hello-world");
        assert_eq!(messages.len(), 2);
        let json = serde_json::to_string(&messages).unwrap();
        assert!(json.contains("octocat/hello-world"));
        assert!(json.contains("create_issue"));
    }

    #[tokio::test]
    async fn test_tool_success_result() {
        let transport = Arc::new(FakeTransport::new().respond(
            201,
            r#"{"id":1,"html_url":"https://github.com/octocat/hello-world/issues/1#issuecomment-1"}"#,
        ));
        let server = make_server(&transport, true);
        let result = server
            .run(CommentOnIssueParams {
                owner: "octocat".to_string(),
                repo: "hello-world".to_string(),
                issue_number: 1,
                body: "Thanks for the report".to_string(),
            })
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            result_text(&result),
            "Commented: https://github.com/octocat/hello-world/issues/1#issuecomment-1"
        );
    }

    #[tokio::test]
    async fn test_tool_error_envelope() {
        let transport = Arc::new(FakeTransport::new());
        let server = make_server(&transport, false);
        let result = server
            .run(create_params("Crash on start", "Steps to reproduce"))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let envelope: serde_json::Value = serde_json::from_str(&result_text(&result)).unwrap();
        assert_eq!(envelope["error"]["type"], ErrorKind::Unauthorized.as_str());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_params_are_protocol_errors() {
        let transport = Arc::new(FakeTransport::new());
        let server = make_server(&transport, true);
        let err = server
            .run(create_params("Bug", "Steps to reproduce"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(transport.call_count(), 0);
    }
}

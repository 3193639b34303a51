//! Access mediation between the protocol front-end and GitHub.
//!
//! Each request passes at most three steps: the write-gate (token present
//! for mutating operations), the allow-gate (repository in the allowlist),
//! and delegation to [`GithubClient`]. Both gates run before any network
//! call. Every outcome comes back as an [`OperationResult`]; nothing escapes
//! as a panic or raw error.

use std::sync::Arc;

use crate::client::{
    Account, GithubClient, Issue, Label, LabelRemoval, Milestone, PullRequest, Transport,
};
use crate::config::GateConfig;
use crate::error::ErrorDescriptor;
use crate::operation::{ItemState, MergeMethod, Operation, OperationRequest, RepoRef};

/// Success text or a structured failure.
pub type OperationResult = Result<String, ErrorDescriptor>;

/// Page size used by markdown resource listings.
pub const LISTING_PAGE_SIZE: u8 = 20;
const LABEL_LISTING_PAGE_SIZE: u8 = 100;

/// Read-only listings exposed as resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Issues,
    Labels,
    PullRequests,
}

pub struct AccessMediator {
    config: Arc<GateConfig>,
    client: GithubClient,
}

impl AccessMediator {
    pub fn new(config: Arc<GateConfig>, transport: Arc<dyn Transport>) -> Self {
        let client = GithubClient::new(transport, config.can_write());
        Self { config, client }
    }

    /// Write-gate, then allow-gate.
    pub fn authorize(&self, request: &OperationRequest) -> Result<(), ErrorDescriptor> {
        let operation = &request.operation;
        if operation.is_write() && !self.config.can_write() {
            tracing::warn!(
                operation = operation.name(),
                repo = %request.repo,
                "Rejected write: no GitHub token configured"
            );
            return Err(ErrorDescriptor::unauthorized(operation.name()));
        }
        if !self.config.allowlist().contains(&request.repo) {
            tracing::warn!(
                operation = operation.name(),
                repo = %request.repo,
                "Rejected request: repository not in allowlist"
            );
            return Err(ErrorDescriptor::forbidden(&request.repo));
        }
        Ok(())
    }

    pub async fn execute(&self, request: OperationRequest) -> OperationResult {
        self.authorize(&request)?;
        let OperationRequest { repo, operation } = request;
        let name = operation.name();

        if let Operation::MergePr {
            number,
            method,
            require_confirmation: true,
        } = operation
        {
            tracing::info!(repo = %repo, number, "Merge held for confirmation");
            return Ok(merge_confirmation_message(&repo, number, method));
        }

        tracing::debug!(operation = name, repo = %repo, "Delegating to GitHub");
        let client = &self.client;
        match operation {
            Operation::ListIssues { state, per_page } => {
                let issues = client.list_issues(&repo, state, per_page).await?;
                Ok(issue_lines(&issues).unwrap_or_else(|| {
                    format!("No issues found in {} (state={}).", repo, state.as_str())
                }))
            }
            Operation::SearchIssues { query, per_page } => {
                let results = client.search_issues(&repo, &query, per_page).await?;
                if results.items.is_empty() {
                    return Ok(format!("No issues matched \"{}\" in {}.", query, repo));
                }
                Ok(results
                    .items
                    .iter()
                    .map(|i| format!("#{} {} – {}", i.number, i.title, i.html_url))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Operation::CreateIssue { title, body } => {
                let issue = client.create_issue(&repo, &title, &body).await?;
                Ok(format!("Created issue #{}: {}", issue.number, issue.html_url))
            }
            Operation::CommentOnIssue { issue_number, body } => {
                let comment = client.comment_on_issue(&repo, issue_number, &body).await?;
                Ok(format!("Commented: {}", comment.html_url))
            }
            Operation::ListLabels { per_page } => {
                let labels = client.list_labels(&repo, per_page).await?;
                if labels.is_empty() {
                    return Ok(format!("No labels defined in {}.", repo));
                }
                Ok(labels
                    .iter()
                    .map(|l| match l.description.as_deref() {
                        Some(d) if !d.is_empty() => format!("{} – {}", l.name, d),
                        _ => l.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Operation::AddLabel {
                issue_number,
                labels,
            } => {
                let current = client
                    .add_labels_to_issue(&repo, issue_number, &labels)
                    .await?;
                Ok(format!(
                    "Added labels [{}] to issue #{}. Current labels: {}",
                    labels.join(", "),
                    issue_number,
                    label_names(&current)
                ))
            }
            Operation::RemoveLabel {
                issue_number,
                label,
            } => match client
                .remove_label_from_issue(&repo, issue_number, &label)
                .await?
            {
                LabelRemoval::Removed => Ok(format!(
                    "Removed label '{}' from issue #{}",
                    label, issue_number
                )),
                LabelRemoval::AlreadyAbsent => Ok(format!(
                    "Label '{}' was not on issue #{} (nothing to remove)",
                    label, issue_number
                )),
            },
            Operation::ListMilestones { state, per_page } => {
                let milestones = client.list_milestones(&repo, state, per_page).await?;
                if milestones.is_empty() {
                    return Ok(format!(
                        "No milestones found in {} (state={}).",
                        repo,
                        state.as_str()
                    ));
                }
                Ok(milestones
                    .iter()
                    .map(milestone_line)
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Operation::ListPullRequests { state, per_page } => {
                let pulls = client.list_pull_requests(&repo, state, per_page).await?;
                if pulls.is_empty() {
                    return Ok(format!(
                        "No pull requests found in {} (state={}).",
                        repo,
                        state.as_str()
                    ));
                }
                Ok(pulls
                    .iter()
                    .map(|p| {
                        format!(
                            "#{} {} ({} → {}) – {}",
                            p.number, p.title, p.head.ref_field, p.base.ref_field, p.html_url
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Operation::LabelPr { number, labels } => {
                let current = client.label_pr(&repo, number, &labels).await?;
                Ok(format!(
                    "Added labels [{}] to PR #{}. Current labels: {}",
                    labels.join(", "),
                    number,
                    label_names(&current)
                ))
            }
            Operation::RequestReview { number, reviewers } => {
                let pr = client.request_review(&repo, number, &reviewers).await?;
                Ok(format!(
                    "Requested review from {} on PR #{}: {}",
                    reviewers.join(", "),
                    number,
                    pr.html_url
                ))
            }
            Operation::MergePr { number, method, .. } => {
                let outcome = client.merge_pr(&repo, number, method).await?;
                if !outcome.merged {
                    return Err(ErrorDescriptor::github_api(
                        Some(200),
                        format!("GitHub mergePR did not merge PR #{}: {}", number, outcome.message),
                        "Pull request cannot be merged. Check merge requirements.",
                    ));
                }
                let sha = outcome.sha.as_deref().unwrap_or("unknown");
                Ok(format!(
                    "Successfully merged PR #{} in {} using {} (sha {}): {}",
                    number,
                    repo,
                    method.as_str(),
                    sha,
                    outcome.message
                ))
            }
        }
    }

    /// Markdown listing for a resource read. Goes through the same gates as
    /// the equivalent read tool.
    pub async fn render_listing(
        &self,
        listing: Listing,
        repo: &RepoRef,
        state: ItemState,
    ) -> Result<String, ErrorDescriptor> {
        let operation = match listing {
            Listing::Issues => Operation::ListIssues {
                state,
                per_page: LISTING_PAGE_SIZE,
            },
            Listing::Labels => Operation::ListLabels {
                per_page: LABEL_LISTING_PAGE_SIZE,
            },
            Listing::PullRequests => Operation::ListPullRequests {
                state,
                per_page: LISTING_PAGE_SIZE,
            },
        };
        self.authorize(&OperationRequest::new(repo.clone(), operation))?;

        let markdown = match listing {
            Listing::Issues => {
                let issues = self
                    .client
                    .list_issues(repo, state, LISTING_PAGE_SIZE)
                    .await?;
                issues_markdown(repo, state, &issues)
            }
            Listing::Labels => {
                let labels = self
                    .client
                    .list_labels(repo, LABEL_LISTING_PAGE_SIZE)
                    .await?;
                labels_markdown(repo, &labels)
            }
            Listing::PullRequests => {
                let pulls = self
                    .client
                    .list_pull_requests(repo, state, LISTING_PAGE_SIZE)
                    .await?;
                pulls_markdown(repo, state, &pulls)
            }
        };
        Ok(markdown)
    }
}

fn merge_confirmation_message(repo: &RepoRef, number: u64, method: MergeMethod) -> String {
    format!(
        "⚠️ Confirmation required: this will merge PR #{} in {} using the '{}' method. \
         Call merge_pr again with require_confirmation=false to proceed.",
        number,
        repo,
        method.as_str()
    )
}

fn author(user: Option<&Account>) -> &str {
    user.map(|u| u.login.as_str()).unwrap_or("unknown")
}

fn issue_lines(issues: &[Issue]) -> Option<String> {
    if issues.is_empty() {
        return None;
    }
    Some(
        issues
            .iter()
            .map(|i| {
                format!(
                    "#{} {} (by @{}) – {}",
                    i.number,
                    i.title,
                    author(i.user.as_ref()),
                    i.html_url
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn label_names(labels: &[Label]) -> String {
    if labels.is_empty() {
        return "(none)".to_string();
    }
    labels
        .iter()
        .map(|l| l.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn milestone_line(m: &Milestone) -> String {
    let due = m
        .due_on
        .as_deref()
        .map(|d| format!(", due {}", d))
        .unwrap_or_default();
    format!(
        "#{} {} ({}, {} open / {} closed{}) – {}",
        m.number, m.title, m.state, m.open_issues, m.closed_issues, due, m.html_url
    )
}

fn issues_markdown(repo: &RepoRef, state: ItemState, issues: &[Issue]) -> String {
    let mut md = format!("# {} issues (state={})\n\n", repo, state.as_str());
    if issues.is_empty() {
        md.push_str("_No issues found._");
        return md;
    }
    let items: Vec<String> = issues
        .iter()
        .map(|i| {
            format!(
                "- #{} {} (by @{})\n  {}",
                i.number,
                i.title,
                author(i.user.as_ref()),
                i.html_url
            )
        })
        .collect();
    md.push_str(&items.join("\n"));
    md
}

fn labels_markdown(repo: &RepoRef, labels: &[Label]) -> String {
    let mut md = format!("# {} labels\n\n", repo);
    if labels.is_empty() {
        md.push_str("_No labels defined._");
        return md;
    }
    let items: Vec<String> = labels
        .iter()
        .map(|l| {
            let color = l
                .color
                .as_deref()
                .map(|c| format!(" (`#{}`)", c))
                .unwrap_or_default();
            match l.description.as_deref() {
                Some(d) if !d.is_empty() => format!("- **{}**{}: {}", l.name, color, d),
                _ => format!("- **{}**{}", l.name, color),
            }
        })
        .collect();
    md.push_str(&items.join("\n"));
    md
}

fn pulls_markdown(repo: &RepoRef, state: ItemState, pulls: &[PullRequest]) -> String {
    let mut md = format!("# {} pull requests (state={})\n\n", repo, state.as_str());
    if pulls.is_empty() {
        md.push_str("_No pull requests found._");
        return md;
    }
    let items: Vec<String> = pulls
        .iter()
        .map(|p| {
            let draft = if p.draft.unwrap_or(false) { " [draft]" } else { "" };
            format!(
                "- #{} {}{} (by @{}) `{}` → `{}`\n  {}",
                p.number,
                p.title,
                draft,
                author(p.user.as_ref()),
                p.head.ref_field,
                p.base.ref_field,
                p.html_url
            )
        })
        .collect();
    md.push_str(&items.join("\n"));
    md
}

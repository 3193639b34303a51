//! MCP server that gives LLM agents allowlist-gated access to GitHub issues,
//! labels, milestones, and pull requests.
//!
//! Every tool call and resource read passes through the [`mediator`], which
//! rejects writes without a token and any repository outside the allowlist
//! before the [`client`] talks to GitHub.

pub mod client;
pub mod config;
pub mod error;
pub mod mediator;
pub mod operation;
pub mod server;

#[cfg(test)]
mod testing;

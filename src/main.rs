use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mcp_github_gate::client::{OctocrabTransport, DEFAULT_API_URL};
use mcp_github_gate::config::{Allowlist, Credential, GateConfig, DEFAULT_CONFIG_PATH, DEFAULT_TOKEN_ENV};
use mcp_github_gate::mediator::AccessMediator;
use mcp_github_gate::server::GithubGateServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

/// Allowlist-gated MCP server for GitHub issues, labels, milestones, and pull requests
#[derive(Parser)]
#[command(name = "mcp-github-gate", version, about)]
struct Cli {
    /// GitHub personal access token. Without one, write tools are refused.
    #[arg(long)]
    token: Option<String>,

    /// Read GitHub token from an environment variable.
    /// Default: GITHUB_TOKEN
    #[arg(long = "token-env")]
    token_env: Option<String>,

    /// Path to the JSON file listing allowed repositories
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// GitHub REST API base URL
    #[arg(long = "api-url", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --token > --token-env > GITHUB_TOKEN
    let env_name = cli.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    let credential = Credential::from_sources(cli.token, std::env::var(env_name).ok());

    let config = Arc::new(GateConfig::new(Allowlist::load(&cli.config), credential));
    config.log_access_mode();

    let transport = OctocrabTransport::connect(&cli.api_url, config.credential())
        .map_err(|e| anyhow::anyhow!("Failed to create GitHub client: {}", e))?;

    tracing::info!(
        api_url = %cli.api_url,
        authenticated = config.can_write(),
        allowed = config.allowlist().len(),
        "Starting mcp-github-gate server"
    );

    let mediator = AccessMediator::new(config, Arc::new(transport));
    let service = GithubGateServer::new(mediator);
    let running = service.serve(stdio()).await?;
    running.waiting().await?;

    Ok(())
}

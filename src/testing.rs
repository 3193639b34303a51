//! Test helpers: a scripted [`Transport`] that records every request.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{Transport, UpstreamRequest, UpstreamResponse};
use crate::config::{Allowlist, Credential, GateConfig};
use crate::error::UpstreamError;

/// Replies with queued responses in order; a 500 once the queue is empty.
#[derive(Default)]
pub(crate) struct FakeTransport {
    responses: Mutex<VecDeque<UpstreamResponse>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, status: u16, body: &str) -> Self {
        self.push(UpstreamResponse {
            status,
            rate_limit_remaining: Some("4999".to_string()),
            body: body.to_string(),
        })
    }

    pub(crate) fn respond_rate_limited(self) -> Self {
        self.push(UpstreamResponse {
            status: 403,
            rate_limit_remaining: Some("0".to_string()),
            body: r#"{"message":"API rate limit exceeded"}"#.to_string(),
        })
    }

    fn push(self, response: UpstreamResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub(crate) fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or(UpstreamResponse {
            status: 500,
            rate_limit_remaining: None,
            body: "no scripted response".to_string(),
        }))
    }
}

pub(crate) fn gate_config(repos: &[&str], with_token: bool) -> GateConfig {
    let credential = if with_token {
        Credential::new("ghp_test_token")
    } else {
        None
    };
    GateConfig::new(Allowlist::from_repos(repos), credential)
}

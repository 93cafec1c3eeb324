//! GitHub commits API upstream.
//!
//! Fetches `GET /repos/{owner}/{repo}/commits?per_page=N` and turns each commit
//! into an [`Item`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{Upstream, UpstreamError, UpstreamPage};
use crate::config::UpstreamConfig;
use crate::domain::{Item, RateLimit};

const ACCEPT_GITHUB_V3: &str = "application/vnd.github.v3+json";

/// Handle used when the commit has no linked account.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// GitHub-backed upstream client.
#[derive(Debug, Clone)]
pub struct GithubUpstream {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    user_agent: String,
}

impl GithubUpstream {
    /// Create a client from config.
    ///
    /// A missing token is not an error here; every fetch reports it instead.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            config.base_url.trim_end_matches('/'),
            config.owner,
            config.repo,
            config.page_size()
        );

        let token = config.resolve_token();
        if token.is_none() {
            warn!(
                "No upstream token configured (set upstream.token or ${})",
                config.token_env
            );
        }

        Ok(Self {
            http,
            url,
            token,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fully resolved request URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Upstream for GithubUpstream {
    async fn fetch(&self) -> Result<UpstreamPage, UpstreamError> {
        let Some(ref token) = self.token else {
            return Err(UpstreamError::Unauthorized {
                status: None,
                detail: "GitHub token not configured".to_string(),
            });
        };

        debug!("Fetching upstream items: {}", self.url);

        let response = self
            .http
            .get(&self.url)
            .bearer_auth(token)
            .header(ACCEPT, ACCEPT_GITHUB_V3)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let rate_limit = rate_limit_from_headers(response.headers());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Upstream API error {}: {}", status, excerpt(&body));
            return Err(status_error(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| UpstreamError::Shape(e.to_string()))?;

        let items = transform(value)?;
        debug!("Upstream returned {} item(s)", items.len());

        Ok(UpstreamPage { items, rate_limit })
    }
}

fn status_error(status: StatusCode) -> UpstreamError {
    let detail = status.canonical_reason().unwrap_or("Unknown").to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Unauthorized {
            status: Some(status.as_u16()),
            detail,
        },
        _ => UpstreamError::Status {
            status: status.as_u16(),
            detail,
        },
    }
}

/// Read `x-ratelimit-*` headers. Returns `None` when none are present.
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimit> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let rate_limit = RateLimit {
        limit: read("x-ratelimit-limit"),
        remaining: read("x-ratelimit-remaining"),
        reset: read("x-ratelimit-reset"),
    };

    (!rate_limit.is_empty()).then_some(rate_limit)
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitRecord {
    sha: String,
    commit: CommitDetail,
    author: Option<Account>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitDetail {
    message: String,
    author: Option<Signature>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Signature {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Account {
    login: Option<String>,
    avatar_url: Option<String>,
}

impl From<CommitRecord> for Item {
    fn from(record: CommitRecord) -> Self {
        let (title, subtitle) = split_message(&record.commit.message);
        let signature = record.commit.author.unwrap_or_default();
        let account = record.author.unwrap_or_default();

        Item {
            id: record.sha,
            title,
            subtitle,
            author_name: non_empty(signature.name).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            author_handle: non_empty(account.login).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            author_avatar_url: non_empty(account.avatar_url),
            timestamp: signature.date.unwrap_or_default(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// First line becomes the title, the rest (if any) the subtitle.
fn split_message(message: &str) -> (String, Option<String>) {
    let mut lines = message.lines();
    let title = lines.next().unwrap_or_default().trim().to_string();
    let rest = lines.collect::<Vec<_>>().join("\n");
    let rest = rest.trim();
    let subtitle = (!rest.is_empty()).then(|| rest.to_string());
    (title, subtitle)
}

/// Transform an upstream response body into items.
///
/// The body must be an array; individual records that cannot be read are
/// skipped rather than failing the batch.
pub fn transform(body: Value) -> Result<Vec<Item>, UpstreamError> {
    let Value::Array(records) = body else {
        return Err(UpstreamError::Shape(format!(
            "expected an array of commits, got {}",
            json_kind(&body)
        )));
    };

    let mut items = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<CommitRecord>(record) {
            Ok(record) => items.push(Item::from(record)),
            Err(e) => warn!("Skipping malformed upstream record #{}: {}", index, e),
        }
    }

    Ok(items)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

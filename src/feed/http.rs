//! Feed source that calls the cache endpoint over HTTP.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::trace;

use super::{FeedError, FeedSource};
use crate::api::ItemsBody;
use crate::domain::FetchOutcome;

/// HTTP client for `GET /api/items`.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    http: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<FetchOutcome, FeedError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        trace!("Cache endpoint replied {}: {} byte(s)", status, text.len());

        let body = match serde_json::from_str::<ItemsBody>(&text) {
            Ok(body) => body,
            // Error pages without a JSON body still map to an error outcome.
            Err(_) if !status.is_success() => ItemsBody::default(),
            Err(e) => return Err(FeedError::Decode(e.to_string())),
        };

        Ok(body.into_outcome(status.as_u16()))
    }
}

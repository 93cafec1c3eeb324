//! JSON body of the cache endpoint.
//!
//! Shared by the server (which renders a [`FetchOutcome`] into it) and the
//! feed client (which reads it back).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{FetchOutcome, Item, RateLimit, StaleReason};

/// Path the cache endpoint is mounted on.
pub const ITEMS_PATH: &str = "/api/items";

/// Fallback message when an error body carries none.
pub const DEFAULT_ERROR: &str = "Failed to fetch items";

/// Response body of `GET /api/items`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsBody {
    #[serde(default)]
    pub data: Vec<Item>,

    #[serde(default)]
    pub cached: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_reason: Option<StaleReason>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Upstream status echoed on errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    /// Seconds since the cached batch was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age: Option<u64>,
}

impl ItemsBody {
    /// Render an outcome as an HTTP status and body.
    pub fn from_outcome(outcome: FetchOutcome) -> (u16, Self) {
        match outcome {
            FetchOutcome::Fresh {
                items,
                cached,
                age,
                rate_limit,
            } => (
                200,
                Self {
                    data: items,
                    cached,
                    rate_limit,
                    cache_age: age.map(|a| a.as_secs()),
                    ..Default::default()
                },
            ),
            FetchOutcome::Stale { items, reason } => (
                200,
                Self {
                    data: items,
                    cached: true,
                    stale: Some(true),
                    stale_reason: Some(reason),
                    error: Some(reason.message().to_string()),
                    ..Default::default()
                },
            ),
            FetchOutcome::Error { message, status } => (
                status,
                Self {
                    error: Some(message),
                    status: Some(status),
                    ..Default::default()
                },
            ),
        }
    }

    /// Interpret a body received with `status`.
    pub fn into_outcome(self, status: u16) -> FetchOutcome {
        if !(200..300).contains(&status) {
            return FetchOutcome::Error {
                message: self.error.unwrap_or_else(|| DEFAULT_ERROR.to_string()),
                status,
            };
        }

        if self.stale == Some(true) {
            return FetchOutcome::Stale {
                items: self.data,
                reason: self.stale_reason.unwrap_or(StaleReason::UpstreamError),
            };
        }

        FetchOutcome::Fresh {
            items: self.data,
            cached: self.cached,
            age: self.cache_age.map(Duration::from_secs),
            rate_limit: self.rate_limit,
        }
    }
}

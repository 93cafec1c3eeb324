//! Domain types for attract-mode items and cache outcomes.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// A single display item produced from an upstream record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Upstream identifier (commit sha).
    pub id: String,

    /// Headline: the first line of the upstream message.
    pub title: String,

    /// Remaining message lines, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    pub author_name: String,

    pub author_handle: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,

    /// Upstream timestamp, passed through verbatim.
    pub timestamp: String,
}

impl Item {
    /// First seven characters of the identifier.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(7) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}

/// Upstream rate-limit telemetry taken from response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Reset time as Unix epoch seconds.
    pub reset: Option<u64>,
}

impl RateLimit {
    /// Returns true if none of the headers were present.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none()
    }
}

/// Why stale data was served instead of a fresh batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleReason {
    /// Upstream answered with a non-success status.
    #[serde(rename = "upstream")]
    UpstreamError,
    /// The request never produced a usable response (network, timeout, shape).
    #[serde(rename = "server")]
    ServerError,
}

impl StaleReason {
    /// Human readable message surfaced to clients.
    pub fn message(self) -> &'static str {
        match self {
            Self::UpstreamError => "Using stale cache due to API error",
            Self::ServerError => "Using stale cache due to server error",
        }
    }
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of asking the cache for items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Items within their freshness window.
    Fresh {
        items: Vec<Item>,
        /// True when served from the cache without an upstream call.
        cached: bool,
        /// Age of the cached batch when `cached` is true.
        age: Option<Duration>,
        rate_limit: Option<RateLimit>,
    },

    /// Last known-good items, served after a failed refresh.
    Stale {
        items: Vec<Item>,
        reason: StaleReason,
    },

    /// No usable items.
    Error {
        message: String,
        /// HTTP status to report to clients.
        status: u16,
    },
}

impl FetchOutcome {
    /// Items carried by this outcome (empty for `Error`).
    pub fn items(&self) -> &[Item] {
        match self {
            Self::Fresh { items, .. } | Self::Stale { items, .. } => items,
            Self::Error { .. } => &[],
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
pub(crate) fn test_item(id: &str, title: &str) -> Item {
    Item {
        id: id.to_string(),
        title: title.to_string(),
        subtitle: None,
        author_name: "Ada".to_string(),
        author_handle: "ada".to_string(),
        author_avatar_url: None,
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    }
}

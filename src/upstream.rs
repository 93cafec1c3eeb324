//! Upstream item sources.
//!
//! The cache only talks to the [`Upstream`] trait; `github` provides the
//! production implementation.

pub mod github;

use async_trait::async_trait;
pub use github::GithubUpstream;
use thiserror::Error;

use crate::domain::{Item, RateLimit, StaleReason};

/// One successful upstream response, already transformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamPage {
    pub items: Vec<Item>,
    pub rate_limit: Option<RateLimit>,
}

/// Trait for item sources backing the cache.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch the current list of items.
    async fn fetch(&self) -> Result<UpstreamPage, UpstreamError>;
}

/// Errors that can occur while fetching from upstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Credential missing or rejected. Not worth retrying.
    #[error("Upstream credential rejected or missing: {detail}")]
    Unauthorized { status: Option<u16>, detail: String },

    #[error("Upstream returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Unexpected upstream response shape: {0}")]
    Shape(String),
}

impl UpstreamError {
    /// Reason reported when stale data covers for this failure.
    pub fn stale_reason(&self) -> StaleReason {
        match self {
            Self::Unauthorized { .. } | Self::Status { .. } => StaleReason::UpstreamError,
            Self::Transport(_) | Self::Shape(_) => StaleReason::ServerError,
        }
    }

    /// HTTP status to report when no cached data exists.
    pub fn status(&self) -> u16 {
        match self {
            Self::Status { status, .. }
            | Self::Unauthorized {
                status: Some(status),
                ..
            } => *status,
            _ => 500,
        }
    }

    /// Client-facing message when no cached data exists.
    pub fn client_message(&self) -> String {
        match self {
            Self::Unauthorized { detail, .. } => format!("Upstream not authorized: {detail}"),
            Self::Status { status, detail } => {
                format!("Failed to fetch items from upstream ({status}: {detail})")
            }
            Self::Transport(detail) | Self::Shape(detail) => {
                format!("Internal server error: {detail}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_reason_mapping() {
        let status = UpstreamError::Status {
            status: 502,
            detail: "Bad Gateway".to_string(),
        };
        assert_eq!(status.stale_reason(), StaleReason::UpstreamError);
        assert_eq!(status.status(), 502);

        let transport = UpstreamError::Transport("connection refused".to_string());
        assert_eq!(transport.stale_reason(), StaleReason::ServerError);
        assert_eq!(transport.status(), 500);

        assert_eq!(
            transport.client_message(),
            "Internal server error: connection refused"
        );

        let shape = UpstreamError::Shape("expected array".to_string());
        assert_eq!(shape.stale_reason(), StaleReason::ServerError);
        assert!(shape.client_message().ends_with("expected array"));

        let missing = UpstreamError::Unauthorized {
            status: None,
            detail: "token not configured".to_string(),
        };
        assert_eq!(missing.status(), 500);
        assert!(missing.client_message().contains("token not configured"));

        let rejected = UpstreamError::Unauthorized {
            status: Some(401),
            detail: "Bad credentials".to_string(),
        };
        assert_eq!(rejected.status(), 401);
        assert_eq!(rejected.stale_reason(), StaleReason::UpstreamError);
    }
}

//! Configuration loading and defaults for kiosk-attract.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::idle::{IdleConfig, InputEvent};

/// Largest page size the upstream accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Main configuration for kiosk-attract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
}

/// Cache endpoint listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind (default: 127.0.0.1:3000).
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Upstream commits API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API root (default: <https://api.github.com>).
    pub base_url: String,

    pub owner: String,

    pub repo: String,

    /// Records per request, clamped to `1..=100` (default: 30).
    pub per_page: u32,

    /// Bearer token. Takes precedence over `token_env`.
    pub token: Option<String>,

    /// Environment variable holding the token (default: `GITHUB_TOKEN`).
    pub token_env: String,

    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,

    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            owner: "Kumarbcom".to_string(),
            repo: "screensaverstvbsk-commits".to_string(),
            per_page: 30,
            token: None,
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_seconds: 10,
            user_agent: concat!("kiosk-attract/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Resolve the bearer token from config or the environment.
    ///
    /// Empty values count as missing.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// Page size bounded to what the upstream accepts.
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Item cache freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window in seconds (default: 300).
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Attract-mode display controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Cache endpoint the feed client calls.
    pub endpoint: String,

    /// Feed client request timeout in milliseconds (default: 30000).
    ///
    /// Must outlast the cache's own upstream bound so a stale reply still
    /// reaches the kiosk when the upstream hangs.
    pub request_timeout_ms: u64,

    /// Quiet period before the overlay takes over, in milliseconds (default: 60000).
    pub idle_timeout_ms: u64,

    /// Whether idle detection runs at all (default: true).
    pub enabled: bool,

    /// Time each item stays on screen, in milliseconds (default: 5000).
    pub rotation_interval_ms: u64,

    /// Fetch once at startup while dormant (default: true).
    pub prefetch: bool,

    /// Input events that count as activity.
    pub events: Vec<InputEvent>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/items".to_string(),
            request_timeout_ms: 30_000,
            idle_timeout_ms: 60_000,
            enabled: true,
            rotation_interval_ms: 5_000,
            prefetch: true,
            events: InputEvent::DEFAULT.to_vec(),
        }
    }
}

impl DisplayConfig {
    /// Idle detector settings derived from this section.
    pub fn idle(&self) -> IdleConfig {
        IdleConfig {
            timeout: Duration::from_millis(self.idle_timeout_ms),
            events: self.events.clone(),
            enabled: self.enabled,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.rotation_interval_ms.max(1))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("kiosk-attract").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }
}

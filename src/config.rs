use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::health::HealthPolicy;
use crate::render::{RenderOptions, RenderStrategy};
use crate::stream::ReconnectPolicy;

/// How snapshots reach the client.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Poll,
    Stream,
    /// Stream for freshness, polling as a safety net
    Both,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    Backoff,
    Fallback,
    Off,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthEndpoint {
    /// `GET /api/ping?device=<id>`
    Ping,
    /// `POST /api/refresh_health`
    #[serde(alias = "refresh_health")]
    Refresh,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub sync_mode: SyncMode,
    pub stream_reconnect: ReconnectMode,
    pub stream_backoff_initial_ms: u64,
    pub stream_backoff_max_ms: u64,
    pub render_strategy: RenderStrategy,
    pub health_up_interval_secs: u64,
    pub health_retry_interval_secs: u64,
    pub health_max_retries: u32,
    pub health_stale_secs: u64,
    pub health_endpoint: HealthEndpoint,
    pub console_host: String,
    pub link_host: String,
    pub notice_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub blur_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: "http://localhost:5000".to_string(),
            poll_interval_ms: 3000,
            sync_mode: SyncMode::Poll,
            stream_reconnect: ReconnectMode::Backoff,
            stream_backoff_initial_ms: 1000,
            stream_backoff_max_ms: 30_000,
            render_strategy: RenderStrategy::Incremental,
            health_up_interval_secs: 60,
            health_retry_interval_secs: 5,
            health_max_retries: crate::health::MAX_RETRIES,
            health_stale_secs: 120,
            health_endpoint: HealthEndpoint::Ping,
            console_host: "192.168.1.102".to_string(),
            link_host: "localhost".to_string(),
            notice_ttl_secs: 5,
            request_timeout_secs: 10,
            blur_grace_ms: 200,
        }
    }
}

impl Config {
    /// The JSON config file wins when present, otherwise the environment.
    pub fn load() -> Result<Self> {
        let path = Self::get_config_file_path();
        if path.exists() {
            return Self::load_from_file();
        }
        Ok(Self::from_env())
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let num = |key: &str, default: u64| -> u64 {
            parse_or_default(key, lookup(key), default, |v| v.parse().ok())
        };

        Config {
            backend_url: lookup("BACKEND_URL").unwrap_or(defaults.backend_url),
            poll_interval_ms: num("POLL_INTERVAL_MS", defaults.poll_interval_ms),
            sync_mode: parse_or_default("SYNC_MODE", lookup("SYNC_MODE"), defaults.sync_mode, |v| {
                match v {
                    "poll" => Some(SyncMode::Poll),
                    "stream" => Some(SyncMode::Stream),
                    "both" => Some(SyncMode::Both),
                    _ => None,
                }
            }),
            stream_reconnect: parse_or_default(
                "STREAM_RECONNECT",
                lookup("STREAM_RECONNECT"),
                defaults.stream_reconnect,
                |v| match v {
                    "backoff" => Some(ReconnectMode::Backoff),
                    "fallback" => Some(ReconnectMode::Fallback),
                    "off" => Some(ReconnectMode::Off),
                    _ => None,
                },
            ),
            stream_backoff_initial_ms: num("STREAM_BACKOFF_INITIAL_MS", defaults.stream_backoff_initial_ms),
            stream_backoff_max_ms: num("STREAM_BACKOFF_MAX_MS", defaults.stream_backoff_max_ms),
            render_strategy: parse_or_default(
                "RENDER_STRATEGY",
                lookup("RENDER_STRATEGY"),
                defaults.render_strategy,
                |v| match v {
                    "incremental" => Some(RenderStrategy::Incremental),
                    "full" | "full_rebuild" => Some(RenderStrategy::FullRebuild),
                    _ => None,
                },
            ),
            health_up_interval_secs: parse_or_default(
                "HEALTH_UP_INTERVAL_SECS",
                lookup("HEALTH_UP_INTERVAL_SECS"),
                defaults.health_up_interval_secs,
                |v| v.parse::<u64>().ok().filter(|n| *n > 0),
            ),
            health_retry_interval_secs: parse_or_default(
                "HEALTH_RETRY_INTERVAL_SECS",
                lookup("HEALTH_RETRY_INTERVAL_SECS"),
                defaults.health_retry_interval_secs,
                |v| v.parse::<u64>().ok().filter(|n| *n > 0),
            ),
            health_max_retries: parse_or_default(
                "HEALTH_MAX_RETRIES",
                lookup("HEALTH_MAX_RETRIES"),
                defaults.health_max_retries,
                |v| v.parse::<u32>().ok().filter(|n| *n > 0),
            ),
            health_stale_secs: num("HEALTH_STALE_SECS", defaults.health_stale_secs),
            health_endpoint: parse_or_default(
                "HEALTH_ENDPOINT",
                lookup("HEALTH_ENDPOINT"),
                defaults.health_endpoint,
                |v| match v {
                    "ping" => Some(HealthEndpoint::Ping),
                    "refresh" | "refresh_health" => Some(HealthEndpoint::Refresh),
                    _ => None,
                },
            ),
            console_host: lookup("CONSOLE_HOST").unwrap_or(defaults.console_host),
            link_host: lookup("LINK_HOST").unwrap_or(defaults.link_host),
            notice_ttl_secs: num("NOTICE_TTL_SECS", defaults.notice_ttl_secs),
            request_timeout_secs: num("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            blur_grace_ms: num("BLUR_GRACE_MS", defaults.blur_grace_ms),
        }
    }

    fn get_config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join("switchboard.json")
    }

    pub fn load_from_file() -> Result<Self> {
        let config_file_path = Self::get_config_file_path();
        let contents = fs::read_to_string(&config_file_path)
            .with_context(|| format!("reading {}", config_file_path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", config_file_path.display()))?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn polls(&self) -> bool {
        matches!(self.sync_mode, SyncMode::Poll | SyncMode::Both)
    }

    pub fn streams(&self) -> bool {
        matches!(self.sync_mode, SyncMode::Stream | SyncMode::Both)
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            up_interval: Duration::from_secs(self.health_up_interval_secs.max(1)),
            retry_interval: Duration::from_secs(self.health_retry_interval_secs.max(1)),
            max_retries: self.health_max_retries.max(1),
            stale_after: Duration::from_secs(self.health_stale_secs),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            strategy: self.render_strategy,
            link_host: self.link_host.clone(),
            console_host: self.console_host.clone(),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.stream_reconnect {
            ReconnectMode::Backoff => ReconnectPolicy::Backoff {
                initial: Duration::from_millis(self.stream_backoff_initial_ms.max(1)),
                max: Duration::from_millis(
                    self.stream_backoff_max_ms.max(self.stream_backoff_initial_ms),
                ),
            },
            ReconnectMode::Fallback => ReconnectPolicy::FallbackToPolling,
            ReconnectMode::Off => ReconnectPolicy::Off,
        }
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.blur_grace_ms)
    }
}

fn parse_or_default<T>(
    key: &str,
    raw: Option<String>,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match parse(raw.trim().to_lowercase().as_str()) {
        Some(value) => value,
        None => {
            warn!(key, value = %raw, "ignoring invalid config value");
            default
        }
    }
}

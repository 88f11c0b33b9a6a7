//! Application-level configuration loading: channel sizing, write bounds and badge delivery.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_MATCH_BACK_CONFIG_PATH";

const DEFAULT_HUB_CAPACITY: usize = 64;
const DEFAULT_FEED_BUFFER: usize = 16;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
const DEFAULT_BADGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Broadcast buffer of each per-game change hub.
    pub hub_capacity: usize,
    /// Channel size between a feed subscription and its consumer.
    pub feed_buffer: usize,
    /// Upper bound on every session write; `None` disables the bound.
    pub write_timeout: Option<Duration>,
    /// Interval of SSE keep-alive comments.
    pub sse_keep_alive: Duration,
    /// Endpoint notified when a game finishes; logging only when absent.
    pub badge_webhook_url: Option<String>,
    /// Longest wait for the badge awarder before a finish carries on without it.
    pub badge_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        hub_capacity = app_config.hub_capacity,
                        feed_buffer = app_config.feed_buffer,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; missing fields keep their default.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hub_capacity: DEFAULT_HUB_CAPACITY,
            feed_buffer: DEFAULT_FEED_BUFFER,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            sse_keep_alive: DEFAULT_SSE_KEEP_ALIVE,
            badge_webhook_url: None,
            badge_timeout: DEFAULT_BADGE_TIMEOUT,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default = "default_hub_capacity")]
    hub_capacity: usize,
    #[serde(default = "default_feed_buffer")]
    feed_buffer: usize,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default = "default_write_timeout")]
    write_timeout_ms: Option<Duration>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_sse_keep_alive")]
    sse_keep_alive_secs: Duration,
    #[serde(default)]
    badge_webhook_url: Option<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_badge_timeout")]
    badge_timeout_ms: Duration,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            // A zero-sized broadcast channel panics on creation.
            hub_capacity: value.hub_capacity.max(1),
            feed_buffer: value.feed_buffer.max(1),
            write_timeout: value.write_timeout_ms,
            sse_keep_alive: value.sse_keep_alive_secs,
            badge_webhook_url: value
                .badge_webhook_url
                .filter(|url| !url.trim().is_empty()),
            badge_timeout: value.badge_timeout_ms,
        }
    }
}

fn default_hub_capacity() -> usize {
    DEFAULT_HUB_CAPACITY
}

fn default_feed_buffer() -> usize {
    DEFAULT_FEED_BUFFER
}

fn default_write_timeout() -> Option<Duration> {
    Some(DEFAULT_WRITE_TIMEOUT)
}

fn default_sse_keep_alive() -> Duration {
    DEFAULT_SSE_KEEP_ALIVE
}

fn default_badge_timeout() -> Duration {
    DEFAULT_BADGE_TIMEOUT
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn durations_are_read_in_their_units() {
        let config = AppConfig::from_json(
            r#"{
                "write_timeout_ms": 250,
                "sse_keep_alive_secs": 3,
                "hub_capacity": 8,
                "badge_timeout_ms": 1500
            }"#,
        )
        .unwrap();

        assert_eq!(config.badge_timeout, Duration::from_millis(1500));

        assert_eq!(config.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.sse_keep_alive, Duration::from_secs(3));
        assert_eq!(config.hub_capacity, 8);
        assert_eq!(config.feed_buffer, DEFAULT_FEED_BUFFER);
    }

    #[test]
    fn null_write_timeout_disables_the_bound() {
        let config = AppConfig::from_json(r#"{"write_timeout_ms": null}"#).unwrap();
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn zero_capacities_and_blank_webhook_are_normalised() {
        let config = AppConfig::from_json(
            r#"{"hub_capacity": 0, "feed_buffer": 0, "badge_webhook_url": "  "}"#,
        )
        .unwrap();

        assert_eq!(config.hub_capacity, 1);
        assert_eq!(config.feed_buffer, 1);
        assert_eq!(config.badge_webhook_url, None);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::from_json(r#"{"hub_capacity": "many"}"#).is_err());
    }
}

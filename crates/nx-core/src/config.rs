//! Configuration parsing for the nxtrad feed client.
//!
//! The runner reads a single JSON config file. Only `stream` is required;
//! every other block falls back to defaults through the `effective_*`
//! accessors.
//!
//! # Example config
//!
//! ```json
//! {
//!   "stream": { "host": "api.tradejini.com", "strict_segments": false, "ping_interval_sec": 30 },
//!   "credentials": { "apikey": "...", "access_token": "..." },
//!   "reconnect": { "initial_delay_ms": 1000, "max_delay_ms": 30000 },
//!   "subscriptions": {
//!     "l1": ["22_NSE", "-1_NSE"],
//!     "depth": ["22_NSE"],
//!     "ohlc": ["22_NSE"], "ohlc_interval": "1M",
//!     "events": ["orders", "positions", "trades"]
//!   },
//!   "log": { "level": "info", "dir": "/tmp/log" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::NxError;
use crate::ws::reconnect::ReconnectConfig;

/// Default feed host.
pub const DEFAULT_HOST: &str = "api.tradejini.com";
/// Default stream path on the feed host.
pub const DEFAULT_PATH: &str = "/v2.1/stream";
/// Protocol version sent as the `version` query parameter.
pub const DEFAULT_PROTOCOL_VERSION: &str = "3.1";

/// Env var overriding `credentials.apikey`.
pub const ENV_APIKEY: &str = "NXTRAD_APIKEY";
/// Env var overriding `credentials.access_token`.
pub const ENV_ACCESS_TOKEN: &str = "NXTRAD_ACCESS_TOKEN";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Feed endpoint and decoder behaviour.
    #[serde(default)]
    pub stream: StreamConfig,

    /// API key and access token used to build the stream auth token.
    pub credentials: Option<Credentials>,

    /// Reconnect backoff settings (used by the runner, not by the stream).
    pub reconnect: Option<ReconnectSettings>,

    /// Symbols to subscribe once the session is connected.
    pub subscriptions: Option<SubscriptionConfig>,

    /// Logging settings.
    pub log: Option<LogSettings>,
}

/// Stream endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfig {
    /// Feed host (default: `api.tradejini.com`).
    pub host: Option<String>,

    /// Stream path (default: `/v2.1/stream`).
    pub path: Option<String>,

    /// Full base URL, overriding `host`/`path` (e.g. `ws://127.0.0.1:9000/stream`).
    pub url: Option<String>,

    /// Protocol version query parameter (default: `3.1`).
    pub protocol_version: Option<String>,

    /// Reject quote/greeks packets carrying an unknown exchange segment instead
    /// of passing their numeric fields through unscaled.
    pub strict_segments: Option<bool>,

    /// Interval for the runner's `PING` keep-alive. Disabled when absent.
    pub ping_interval_sec: Option<u64>,

    /// Extra HTTP headers for the WebSocket handshake.
    pub extra_headers: Option<HashMap<String, String>>,
}

impl StreamConfig {
    /// Base URL of the stream endpoint, without query parameters.
    pub fn effective_base_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let host = self.host.as_deref().unwrap_or(DEFAULT_HOST);
        let path = self.path.as_deref().unwrap_or(DEFAULT_PATH);
        format!("wss://{host}{path}")
    }

    pub fn effective_protocol_version(&self) -> &str {
        self.protocol_version
            .as_deref()
            .unwrap_or(DEFAULT_PROTOCOL_VERSION)
    }

    pub fn is_strict_segments(&self) -> bool {
        self.strict_segments.unwrap_or(false)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_sec
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    pub fn effective_extra_headers(&self) -> HashMap<String, String> {
        self.extra_headers.clone().unwrap_or_default()
    }
}

/// Credentials block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub apikey: Option<String>,
    pub access_token: Option<String>,
}

impl Credentials {
    /// Stream auth token in the `apikey:access_token` form the feed expects.
    pub fn auth_token(&self) -> Result<String, NxError> {
        match (self.apikey.as_deref(), self.access_token.as_deref()) {
            (Some(key), Some(token)) if !key.is_empty() && !token.is_empty() => {
                Ok(format!("{key}:{token}"))
            }
            _ => Err(NxError::Config(
                "credentials.apikey and credentials.access_token are required".into(),
            )),
        }
    }
}

/// Reconnect backoff block. Missing fields take [`ReconnectConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconnectSettings {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter_factor: Option<f64>,
    /// 0 means unlimited.
    pub max_attempts: Option<u32>,
}

impl ReconnectSettings {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        let d = ReconnectConfig::default();
        ReconnectConfig {
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(d.initial_delay),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(d.max_delay),
            multiplier: self.multiplier.unwrap_or(d.multiplier),
            jitter_factor: self.jitter_factor.unwrap_or(d.jitter_factor),
            max_attempts: self.max_attempts.unwrap_or(d.max_attempts),
        }
    }
}

/// Symbols to subscribe after connect. Identifiers use the `token_segment`
/// form, e.g. `"22_NSE"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub l1: Vec<String>,
    #[serde(default)]
    pub depth: Vec<String>,
    #[serde(default)]
    pub greeks: Vec<String>,
    #[serde(default)]
    pub ohlc: Vec<String>,
    /// Bar interval for `ohlc` (e.g. `"1M"`, `"5M"`, `"30M"`).
    pub ohlc_interval: Option<String>,
    /// Account event streams (e.g. `"orders"`, `"positions"`, `"trades"`).
    #[serde(default)]
    pub events: Vec<String>,
}

impl SubscriptionConfig {
    pub fn effective_ohlc_interval(&self) -> &str {
        self.ohlc_interval.as_deref().unwrap_or("1M")
    }
}

/// Logging block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    pub level: Option<String>,
    pub dir: Option<String>,
    /// Emit JSON lines instead of human-readable console output.
    pub json: Option<bool>,
}

impl LogSettings {
    pub fn effective_level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }
}

impl AppConfig {
    /// Fill credentials from `NXTRAD_APIKEY` / `NXTRAD_ACCESS_TOKEN` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_APIKEY).ok(),
            std::env::var(ENV_ACCESS_TOKEN).ok(),
        );
    }

    fn apply_overrides(&mut self, apikey: Option<String>, access_token: Option<String>) {
        if apikey.is_none() && access_token.is_none() {
            return;
        }
        let creds = self.credentials.get_or_insert_with(Credentials::default);
        if apikey.is_some() {
            creds.apikey = apikey;
        }
        if access_token.is_some() {
            creds.access_token = access_token;
        }
    }
}

/// Load and parse a JSON config file, then apply env overrides.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let mut config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.apply_env_overrides();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_tradejini_url() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(
            cfg.stream.effective_base_url(),
            "wss://api.tradejini.com/v2.1/stream"
        );
        assert_eq!(cfg.stream.effective_protocol_version(), "3.1");
        assert!(!cfg.stream.is_strict_segments());
        assert!(cfg.stream.ping_interval().is_none());
    }

    #[test]
    fn url_override_wins() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"stream": {"host": "ignored", "url": "ws://127.0.0.1:9000/s", "ping_interval_sec": 15}}"#,
        )
        .unwrap();
        assert_eq!(cfg.stream.effective_base_url(), "ws://127.0.0.1:9000/s");
        assert_eq!(cfg.stream.ping_interval(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn auth_token_joins_key_and_token() {
        let creds = Credentials {
            apikey: Some("key".into()),
            access_token: Some("tok".into()),
        };
        assert_eq!(creds.auth_token().unwrap(), "key:tok");
        assert!(Credentials::default().auth_token().is_err());
    }

    #[test]
    fn overrides_fill_missing_credentials() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(Some("k".into()), None);
        cfg.apply_overrides(None, Some("t".into()));
        let creds = cfg.credentials.unwrap();
        assert_eq!(creds.auth_token().unwrap(), "k:t");
    }

    #[test]
    fn subscriptions_and_reconnect_parse() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
                "subscriptions": {"l1": ["22_NSE", "-1_NSE"], "ohlc": ["22_NSE"]},
                "reconnect": {"initial_delay_ms": 250, "max_attempts": 5}
            }"#,
        )
        .unwrap();
        let subs = cfg.subscriptions.unwrap();
        assert_eq!(subs.l1, vec!["22_NSE", "-1_NSE"]);
        assert!(subs.depth.is_empty());
        assert_eq!(subs.effective_ohlc_interval(), "1M");

        let rc = cfg.reconnect.unwrap().to_reconnect_config();
        assert_eq!(rc.initial_delay, Duration::from_millis(250));
        assert_eq!(rc.max_attempts, 5);
        assert_eq!(rc.max_delay, ReconnectConfig::default().max_delay);
    }

    #[test]
    fn load_errors_name_the_file() {
        let missing = std::env::temp_dir().join("nx-core-missing-config.json");
        let err = load_config(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("nx-core-missing-config.json"), "{err:#}");

        let bad = std::env::temp_dir()
            .join(format!("nx-core-bad-config-{}.json", std::process::id()));
        std::fs::write(&bad, "{ not json").unwrap();
        let err = load_config(&bad).unwrap_err();
        let _ = std::fs::remove_file(&bad);
        assert!(format!("{err:#}").starts_with("parsing config"), "{err:#}");
    }
}

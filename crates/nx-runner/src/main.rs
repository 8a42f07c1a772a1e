//! # nx-runner
//!
//! Command-line client for the nxtrad streaming feed.
//!
//! Loads a JSON configuration file, connects the stream, subscribes the
//! configured symbols on every (re)connect and logs decoded messages.
//! Lost sessions are retried with exponential backoff, except when the feed
//! rejects the credentials.
//!
//! # Usage
//!
//! ```bash
//! nx-runner config.json --log-level info
//! NXTRAD_ACCESS_TOKEN=... nx-runner config.json --json --log-dir logs
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use nx_core::config::{AppConfig, LogSettings, SubscriptionConfig};
use nx_core::error::NxError;
use nx_core::{DecodedMessage, MessageType};
use nx_md::{ConnectionStatus, NxStream, ReconnectSupervisor, SupervisorExit};
use tracing::{debug, error, info, warn};

/// nxtrad market data stream runner.
#[derive(Parser)]
#[command(name = "nx-runner", about = "nxtrad market data stream runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides `log.level`.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides `log.dir`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = nx_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log = log_settings(&cli, &config);
    nx_core::logging::init_logging(&log, "nx-runner");
    info!(
        "nx-runner starting, config={}, log_level={}",
        cli.config.display(),
        log.effective_level()
    );

    let token = config.credentials.clone().unwrap_or_default().auth_token()?;
    let subscriptions = config.subscriptions.clone().unwrap_or_default();
    let reconnect = config
        .reconnect
        .as_ref()
        .map(|r| r.to_reconnect_config())
        .unwrap_or_default();

    // 3. Wire the stream
    let stream = NxStream::from_config(&config.stream);
    let (supervisor, handle) = ReconnectSupervisor::new(stream.clone(), reconnect);
    let supervisor = supervisor.with_ping_interval(config.stream.ping_interval());

    stream.on_connection(move |s, event| {
        match event.status {
            ConnectionStatus::Connecting => info!("connecting"),
            ConnectionStatus::Connected => {
                info!("connected");
                subscribe_all(s, &subscriptions);
            }
            ConnectionStatus::Closed | ConnectionStatus::Error => {
                warn!(
                    status = %event.status,
                    code = ?event.code,
                    reason = ?event.reason,
                    "connection lost"
                );
            }
        }
        handle.notify(event);
    });
    stream.on_data(|_, msg| log_message(msg));

    stream.connect(&token)?;

    // 4. Supervise until Ctrl+C or a fatal close
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let exit = supervisor.run_until(ctrl_c).await;

    let stats = stream.decode_stats();
    info!(
        frames = stats.frames,
        messages = stats.messages,
        dropped_frames = stats.dropped_frames,
        dropped_packets = stats.dropped_packets,
        "stopped"
    );

    match exit {
        SupervisorExit::Shutdown => Ok(()),
        SupervisorExit::Rejected(reason) => bail!("session rejected: {reason}"),
        SupervisorExit::Exhausted { attempts } => {
            bail!("reconnect attempts exhausted after {attempts}")
        }
        SupervisorExit::Failed(e) => bail!("supervisor stopped: {e}"),
    }
}

fn log_settings(cli: &Cli, config: &AppConfig) -> LogSettings {
    let mut log = config.log.clone().unwrap_or_default();
    if cli.log_level.is_some() {
        log.level.clone_from(&cli.log_level);
    }
    if cli.log_dir.is_some() {
        log.dir.clone_from(&cli.log_dir);
    }
    if cli.json {
        log.json = Some(true);
    }
    log
}

fn subscribe_all(stream: &NxStream, subs: &SubscriptionConfig) {
    let report = |kind: &str, count: usize, res: Result<(), NxError>| match res {
        Ok(()) => info!("subscribed {kind} for {count} symbol(s)"),
        Err(e) => error!("subscribe {kind} failed: {e}"),
    };

    if !subs.l1.is_empty() {
        report("L1", subs.l1.len(), stream.subscribe_l1(subs.l1.as_slice()));
    }
    if !subs.depth.is_empty() {
        report("L5", subs.depth.len(), stream.subscribe_depth(subs.depth.as_slice()));
    }
    if !subs.greeks.is_empty() {
        report("greeks", subs.greeks.len(), stream.subscribe_greeks(subs.greeks.as_slice()));
    }
    if !subs.ohlc.is_empty() {
        let interval = subs.effective_ohlc_interval();
        report(
            "OHLC",
            subs.ohlc.len(),
            stream.subscribe_ohlc(subs.ohlc.as_slice(), interval),
        );
    }
    if !subs.events.is_empty() {
        report("events", subs.events.len(), stream.subscribe_events(subs.events.as_slice()));
    }
}

fn log_message(msg: &DecodedMessage) {
    let line = match serde_json::to_string(msg) {
        Ok(line) => line,
        Err(e) => {
            warn!("failed to encode {} message: {e}", msg.msg_type);
            return;
        }
    };
    match msg.msg_type {
        MessageType::Ping => debug!(target: "nx_runner::data", "{line}"),
        _ => info!(target: "nx_runner::data", "{line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config_logging() {
        let cli = Cli::parse_from(["nx-runner", "cfg.json", "--log-level", "debug", "--json"]);
        let config: AppConfig =
            serde_json::from_str(r#"{"log": {"level": "warn", "dir": "logs"}}"#).unwrap();
        let log = log_settings(&cli, &config);
        assert_eq!(log.effective_level(), "debug");
        assert_eq!(log.dir.as_deref(), Some("logs"));
        assert_eq!(log.json, Some(true));
    }

    #[test]
    fn config_logging_used_without_flags() {
        let cli = Cli::parse_from(["nx-runner", "cfg.json"]);
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        let log = log_settings(&cli, &config);
        assert_eq!(log.effective_level(), "info");
        assert!(log.dir.is_none());
        assert!(log.json.is_none());
    }
}

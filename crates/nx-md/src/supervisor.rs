//! Reconnect and keep-alive supervision for an [`NxStream`].
//!
//! The stream reports lifecycle changes and never retries by itself. A
//! [`ReconnectSupervisor`] runs on its own task, receives those events via a
//! [`SupervisorHandle`] and decides when to call [`NxStream::reconnect`],
//! using [`ReconnectPolicy`] for the delays. The receive loop never waits on
//! a backoff.
//!
//! ```ignore
//! let (supervisor, handle) = ReconnectSupervisor::new(stream.clone(), ReconnectConfig::default());
//! stream.on_connection(move |_, event| handle.notify(event));
//! stream.connect(&token)?;
//! let exit = supervisor.run_until(ctrl_c).await;
//! ```

use std::future::Future;
use std::time::Duration;

use nx_core::error::NxError;
use nx_core::ws::client::CLIENT_CLOSE_REASON;
use nx_core::ws::reconnect::{ReconnectConfig, ReconnectPolicy};
use tokio::sync::mpsc;
use tokio::time::Interval;
use tracing::{debug, error, info, warn};

use crate::stream::{ConnectionEvent, ConnectionStatus, NxStream};

/// Why [`ReconnectSupervisor::run_until`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The shutdown future resolved; the stream was disconnected.
    Shutdown,
    /// The feed closed the session with a reason that retrying cannot fix.
    Rejected(String),
    /// `max_attempts` reconnects failed in a row.
    Exhausted { attempts: u32 },
    /// `reconnect()` itself failed (no token, no runtime, bad url).
    Failed(String),
}

/// Feeds lifecycle events to a supervisor. Cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl SupervisorHandle {
    /// Forward one event. Call from the stream's connection callback.
    pub fn notify(&self, event: &ConnectionEvent) {
        let _ = self.tx.send(event.clone());
    }
}

pub struct ReconnectSupervisor {
    stream: NxStream,
    policy: ReconnectPolicy,
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    ping: Option<Interval>,
}

impl ReconnectSupervisor {
    pub fn new(stream: NxStream, config: ReconnectConfig) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            stream,
            policy: ReconnectPolicy::new(config),
            rx,
            ping: None,
        };
        (supervisor, SupervisorHandle { tx })
    }

    /// Send a `PING` request every `interval` while connected.
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping = interval.map(tokio::time::interval);
        self
    }

    /// Supervise until `shutdown` resolves or retrying is pointless.
    pub async fn run_until<F>(mut self, shutdown: F) -> SupervisorExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    self.stream.disconnect();
                    return SupervisorExit::Shutdown;
                }

                _ = tick(&mut self.ping) => {
                    match self.stream.send_ping() {
                        Ok(()) => debug!("ping sent"),
                        Err(NxError::NotConnected) => {}
                        Err(e) => warn!("ping failed: {e}"),
                    }
                }

                event = self.rx.recv() => {
                    let Some(event) = event else {
                        return SupervisorExit::Failed("lifecycle channel closed".into());
                    };
                    match event.status {
                        ConnectionStatus::Connecting => {}
                        ConnectionStatus::Connected => self.policy.reset(),
                        ConnectionStatus::Closed | ConnectionStatus::Error => {
                            let reason = event.reason.as_deref();
                            if reason == Some(CLIENT_CLOSE_REASON) {
                                continue;
                            }
                            if !ReconnectPolicy::is_retryable(reason) {
                                error!(?reason, "feed rejected the session, not retrying");
                                let reason = reason.unwrap_or_default().to_string();
                                return SupervisorExit::Rejected(reason);
                            }
                            let Some(delay) = self.policy.next_delay() else {
                                let attempts = self.policy.attempt_count();
                                error!(attempts, "giving up reconnecting");
                                return SupervisorExit::Exhausted { attempts };
                            };
                            info!(
                                attempt = self.policy.attempt_count(),
                                delay_ms = delay.as_millis() as u64,
                                "reconnecting after backoff"
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = &mut shutdown => {
                                    info!("shutdown requested during backoff");
                                    self.stream.disconnect();
                                    return SupervisorExit::Shutdown;
                                }
                            }
                            if let Err(e) = self.stream.reconnect() {
                                error!("reconnect failed: {e}");
                                return SupervisorExit::Failed(e.to_string());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Resolves on the next ping tick, or never when pings are off.
async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

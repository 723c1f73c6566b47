//! Bot connection state machine
//!
//! `disconnected → connecting → {connected | error}`. Transitions happen
//! only inside [`BotConnectionState::check_connection`] or when the token is
//! replaced, and every transition is published on a watch channel.

use crate::api::DiscordApi;
use crate::models::User;
use chrono::{DateTime, Utc};
use guildbridge_common::redact_token;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection status of the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No successful check yet, or the token was cleared
    #[default]
    Disconnected,
    /// A check is in flight
    Connecting,
    /// The last check succeeded
    Connected,
    /// The last check failed or timed out
    Error,
}

/// Snapshot of the bot connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConnection {
    /// Current status
    pub status: ConnectionStatus,
    /// Failure message when `status` is `Error`
    pub error: Option<String>,
    /// When the last check finished
    pub last_checked: Option<DateTime<Utc>>,
    /// Bot identity from the last successful check
    pub bot_info: Option<User>,
}

impl BotConnection {
    /// Whether the bot is connected
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Timing settings for connection checks
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Hard ceiling for one check
    pub check_timeout: Duration,
    /// Minimum spacing between manual checks
    pub manual_check_cooldown: Duration,
    /// Health probe interval while connected
    pub health_check_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(10),
            manual_check_cooldown: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(300),
        }
    }
}

/// Connection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// A manual check was requested too soon after the previous one
    #[error("Please wait {}s before checking the connection again", .remaining.as_secs_f64().ceil())]
    Cooldown {
        /// Time until another manual check is accepted
        remaining: Duration,
    },
}

/// Result of a connection check request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran; carries the resulting snapshot
    Checked(BotConnection),
    /// No token is configured; nothing was done
    NoToken,
    /// Another check is already running
    InFlight,
}

struct Inner {
    api: Arc<dyn DiscordApi>,
    settings: ConnectionSettings,
    token: RwLock<Option<String>>,
    token_generation: AtomicU64,
    in_flight: AtomicBool,
    state_tx: watch::Sender<BotConnection>,
    last_manual_check: Mutex<Option<Instant>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.health_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Resets the in-flight flag when a check finishes, including on cancellation.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the bot token and connection status
#[derive(Clone)]
pub struct BotConnectionState {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BotConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConnectionState")
            .field("token", &self.inner.token.read().as_deref().map(redact_token))
            .field("state", &*self.inner.state_tx.borrow())
            .finish()
    }
}

impl BotConnectionState {
    /// Create a disconnected state with no token
    pub fn new(api: Arc<dyn DiscordApi>, settings: ConnectionSettings) -> Self {
        let (state_tx, _) = watch::channel(BotConnection::default());
        Self {
            inner: Arc::new(Inner {
                api,
                settings,
                token: RwLock::new(None),
                token_generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                state_tx,
                last_manual_check: Mutex::new(None),
                health_task: Mutex::new(None),
            }),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> BotConnection {
        self.inner.state_tx.borrow().clone()
    }

    /// Follow state transitions
    pub fn subscribe(&self) -> watch::Receiver<BotConnection> {
        self.inner.state_tx.subscribe()
    }

    /// Whether the last check succeeded
    pub fn is_connected(&self) -> bool {
        self.inner.state_tx.borrow().is_connected()
    }

    /// The configured token, if any
    pub fn token(&self) -> Option<String> {
        self.inner.token.read().clone()
    }

    /// Replace the token. Any change resets the state to `disconnected` and
    /// stops the health probe; a check must be run to connect again.
    pub fn set_token(&self, token: Option<String>) {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        {
            let mut current = self.inner.token.write();
            if *current == token {
                return;
            }
            *current = token;
        }
        self.inner.token_generation.fetch_add(1, Ordering::AcqRel);
        self.stop_health_task();
        self.inner.state_tx.send_replace(BotConnection::default());
        info!("Bot token updated, connection reset");
    }

    /// Probe the token once.
    ///
    /// Concurrent calls collapse: only the first runs, the rest return
    /// [`CheckOutcome::InFlight`]. The probe is bounded by the check timeout.
    /// A successful check starts the periodic health probe; a failed one
    /// stops it.
    pub async fn check_connection(&self) -> CheckOutcome {
        let outcome = self.probe().await;
        if let CheckOutcome::Checked(snapshot) = &outcome {
            if snapshot.is_connected() {
                self.ensure_health_task();
            } else {
                self.stop_health_task();
            }
        }
        outcome
    }

    async fn probe(&self) -> CheckOutcome {
        let Some(token) = self.token() else {
            info!("No bot token configured, skipping connection check");
            return CheckOutcome::NoToken;
        };

        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Connection check already in flight");
            return CheckOutcome::InFlight;
        }
        let _guard = InFlightGuard(&self.inner.in_flight);
        let generation = self.inner.token_generation.load(Ordering::Acquire);

        self.inner.state_tx.send_modify(|state| {
            state.status = ConnectionStatus::Connecting;
            state.error = None;
        });

        let result = tokio::time::timeout(
            self.inner.settings.check_timeout,
            self.inner.api.check_status(&token),
        )
        .await;

        if self.inner.token_generation.load(Ordering::Acquire) != generation {
            debug!("Token changed during connection check, discarding result");
            return CheckOutcome::Checked(self.snapshot());
        }

        let next = match result {
            Ok(Ok(user)) => {
                info!(bot = %user.tag(), "Bot connected");
                BotConnection {
                    status: ConnectionStatus::Connected,
                    error: None,
                    last_checked: Some(Utc::now()),
                    bot_info: Some(user),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Connection check failed");
                BotConnection {
                    status: ConnectionStatus::Error,
                    error: Some(e.to_string()),
                    last_checked: Some(Utc::now()),
                    bot_info: None,
                }
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.inner.settings.check_timeout.as_secs(),
                    "Connection check timed out"
                );
                BotConnection {
                    status: ConnectionStatus::Error,
                    error: Some("Connection check timed out".to_string()),
                    last_checked: Some(Utc::now()),
                    bot_info: None,
                }
            }
        };

        self.inner.state_tx.send_replace(next.clone());
        CheckOutcome::Checked(next)
    }

    /// User-initiated check, rejected within the manual cooldown
    pub async fn manual_check(&self) -> Result<CheckOutcome, ConnectionError> {
        {
            let mut last = self.inner.last_manual_check.lock();
            let cooldown = self.inner.settings.manual_check_cooldown;
            if let Some(at) = *last {
                let elapsed = at.elapsed();
                if elapsed < cooldown {
                    return Err(ConnectionError::Cooldown {
                        remaining: cooldown - elapsed,
                    });
                }
            }
            *last = Some(Instant::now());
        }
        Ok(self.check_connection().await)
    }

    /// Wait until no check is in flight and return the settled snapshot.
    ///
    /// Bounded by the check timeout; returns the current snapshot if that
    /// elapses first.
    pub async fn wait_until_settled(&self) -> BotConnection {
        let mut rx = self.subscribe();
        let settled = tokio::time::timeout(
            self.inner.settings.check_timeout,
            rx.wait_for(|state| state.status != ConnectionStatus::Connecting),
        )
        .await;
        match settled {
            Ok(Ok(state)) => state.clone(),
            _ => self.snapshot(),
        }
    }

    fn ensure_health_task(&self) {
        let mut slot = self.inner.health_task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.settings.health_check_interval;
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else { break };
                let state = BotConnectionState { inner };

                if state.token().is_none() || !state.is_connected() {
                    break;
                }

                debug!("Running periodic connection check");
                match state.probe().await {
                    CheckOutcome::Checked(snapshot) if !snapshot.is_connected() => break,
                    CheckOutcome::NoToken => break,
                    _ => {}
                }
            }
            debug!("Health check stopped");
        }));
        debug!(interval_secs = interval.as_secs(), "Health check started");
    }

    fn stop_health_task(&self) {
        if let Some(handle) = self.inner.health_task.lock().take() {
            handle.abort();
        }
    }

    /// Whether the periodic health probe is running
    pub fn health_check_running(&self) -> bool {
        self.inner
            .health_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDiscord;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            check_timeout: Duration::from_secs(10),
            manual_check_cooldown: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(300),
        }
    }

    fn state_with(fake: Arc<FakeDiscord>) -> BotConnectionState {
        BotConnectionState::new(fake, settings())
    }

    #[tokio::test]
    async fn test_no_token_is_a_noop() {
        let fake = Arc::new(FakeDiscord::new());
        let state = state_with(fake.clone());

        assert_eq!(state.check_connection().await, CheckOutcome::NoToken);
        assert_eq!(state.snapshot().status, ConnectionStatus::Disconnected);
        assert_eq!(fake.calls("check_status"), 0);
    }

    #[tokio::test]
    async fn test_successful_check_connects() {
        let fake = Arc::new(FakeDiscord::new());
        let state = state_with(fake.clone());
        state.set_token(Some("token".to_string()));

        let outcome = state.check_connection().await;
        let CheckOutcome::Checked(snapshot) = outcome else {
            panic!("expected a completed check");
        };
        assert_eq!(snapshot.status, ConnectionStatus::Connected);
        assert_eq!(snapshot.bot_info.unwrap().username, "GuildBridge");
        assert!(snapshot.last_checked.is_some());
        assert!(state.health_check_running());
    }

    #[tokio::test]
    async fn test_failed_check_reports_error() {
        let fake = Arc::new(FakeDiscord::new());
        fake.fail_status("HTTP 401: Unauthorized");
        let state = state_with(fake);
        state.set_token(Some("bad".to_string()));

        let CheckOutcome::Checked(snapshot) = state.check_connection().await else {
            panic!("expected a completed check");
        };
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert!(snapshot.error.unwrap().contains("Unauthorized"));
        assert!(!state.health_check_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_times_out() {
        let fake = Arc::new(FakeDiscord::new());
        fake.delay_status(Duration::from_secs(60));
        let state = state_with(fake);
        state.set_token(Some("slow".to_string()));

        let start = Instant::now();
        let CheckOutcome::Checked(snapshot) = state.check_connection().await else {
            panic!("expected a completed check");
        };
        assert_eq!(snapshot.status, ConnectionStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("Connection check timed out"));
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_collapse() {
        let fake = Arc::new(FakeDiscord::new());
        fake.delay_status(Duration::from_secs(1));
        let state = state_with(fake.clone());
        state.set_token(Some("token".to_string()));

        let (first, second) = tokio::join!(state.check_connection(), state.check_connection());
        let outcomes = [first, second];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, CheckOutcome::InFlight))
                .count(),
            1
        );
        assert_eq!(fake.calls("check_status"), 1);
        assert!(state.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_check_cooldown() {
        let fake = Arc::new(FakeDiscord::new());
        let state = state_with(fake.clone());
        state.set_token(Some("token".to_string()));

        assert!(state.manual_check().await.is_ok());
        tokio::time::advance(Duration::from_secs(1)).await;

        match state.manual_check().await {
            Err(ConnectionError::Cooldown { remaining }) => {
                assert!(remaining <= Duration::from_secs(2));
                assert!(remaining > Duration::ZERO);
            }
            other => panic!("expected cooldown, got {:?}", other),
        }
        assert_eq!(fake.calls("check_status"), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(state.manual_check().await.is_ok());
        assert_eq!(fake.calls("check_status"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_reprobes_while_connected() {
        let fake = Arc::new(FakeDiscord::new());
        let state = state_with(fake.clone());
        state.set_token(Some("token".to_string()));
        state.check_connection().await;
        assert_eq!(fake.calls("check_status"), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(fake.calls("check_status"), 2);

        fake.fail_status("revoked");
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fake.calls("check_status"), 3);
        assert_eq!(state.snapshot().status, ConnectionStatus::Error);

        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(fake.calls("check_status"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearing_token_resets_and_stops_health_check() {
        let fake = Arc::new(FakeDiscord::new());
        let state = state_with(fake.clone());
        state.set_token(Some("token".to_string()));
        state.check_connection().await;
        let mut rx = state.subscribe();

        state.set_token(None);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, ConnectionStatus::Disconnected);
        assert!(!state.health_check_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fake.calls("check_status"), 1);
    }
}

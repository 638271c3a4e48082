//! Background token refresh monitor
//!
//! Polls the stored token set on a fixed period and refreshes it once the
//! remaining lifetime drops below a threshold. A failed refresh logs the user
//! out and stops the monitor; there is no retry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use marketdesk_auth::{AuthClient, MonitorEvent, TokenRefreshMonitor};
//!
//! # async fn example(client: Arc<AuthClient>) {
//! let monitor = Arc::new(TokenRefreshMonitor::new(client));
//! let mut events = monitor.subscribe();
//! monitor.start();
//!
//! while let Ok(event) = events.recv().await {
//!     if let MonitorEvent::LoggedOut { navigation } = event {
//!         println!("Session ended, go to {navigation}");
//!         break;
//!     }
//! }
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::AuthClient;
use crate::types::Navigation;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Shortest accepted poll period; `interval_at` panics on zero
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a refresh attempt made by the monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Tokens were refreshed
    Refreshed {
        /// New expiry instant
        expires_at: DateTime<Utc>,
    },
    /// Remaining lifetime is above the threshold
    NotNeeded,
    /// Another refresh is already running
    InFlight,
    /// The refresh failed and the user was logged out
    LoggedOut {
        /// Where the UI should send the user
        navigation: Navigation,
    },
    /// No token set is stored
    NoSession,
}

/// Notification published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Tokens were refreshed in the background
    Refreshed {
        /// New expiry instant
        expires_at: DateTime<Utc>,
    },
    /// The monitor forced a logout
    LoggedOut {
        /// Where the UI should send the user
        navigation: Navigation,
    },
    /// A check found no stored tokens and the monitor stopped
    SessionEnded,
}

struct MonitorTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Clears the single-flight flag when the refresh settles
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic token refresh monitor
///
/// Shared by `Arc`; `start` spawns the polling task, `stop` cancels it. At
/// most one refresh runs at a time across ticks and `force_refresh` calls.
pub struct TokenRefreshMonitor {
    client: Arc<AuthClient>,
    poll_interval: Duration,
    refresh_threshold: Duration,
    refreshing: AtomicBool,
    task: Mutex<Option<MonitorTask>>,
    events: broadcast::Sender<MonitorEvent>,
}

impl TokenRefreshMonitor {
    /// Create a monitor using the client's configured timings
    #[must_use]
    pub fn new(client: Arc<AuthClient>) -> Self {
        let poll_interval = client.config().poll_interval();
        let refresh_threshold = client.config().refresh_threshold();
        Self::with_timings(client, poll_interval, refresh_threshold)
    }

    /// Create a monitor with explicit timings
    ///
    /// A zero `poll_interval` is raised to one millisecond.
    #[must_use]
    pub fn with_timings(
        client: Arc<AuthClient>,
        poll_interval: Duration,
        refresh_threshold: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            refresh_threshold,
            refreshing: AtomicBool::new(false),
            task: Mutex::new(None),
            events,
        }
    }

    /// Poll period
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Remaining lifetime below which a tick refreshes
    #[must_use]
    pub const fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    /// Subscribe to refresh, logout and session-end notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Start polling
    ///
    /// The first check happens one period after start. Returns `false`
    /// without doing anything if the monitor is already running.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(MonitorTask::is_active) {
            debug!("Token refresh monitor already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            Arc::downgrade(self),
            self.poll_interval,
            cancel.clone(),
        ));
        *task = Some(MonitorTask { handle, cancel });

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            refresh_threshold_secs = self.refresh_threshold.as_secs(),
            "Token refresh monitor started"
        );
        true
    }

    /// Stop polling; safe to call when not running
    ///
    /// A refresh already in progress is allowed to finish.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel.cancel();
            info!("Token refresh monitor stopped");
        }
    }

    /// Whether the polling task is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(MonitorTask::is_active)
    }

    /// Run one polling check now
    ///
    /// Stops the monitor and publishes [`MonitorEvent::SessionEnded`] when
    /// no token is stored; refreshes when the remaining lifetime is below the
    /// threshold.
    pub async fn check_now(&self) -> RefreshOutcome {
        let Some(tokens) = self.client.stored_tokens() else {
            return self.end_session();
        };

        let remaining = tokens.time_until_expiry(Utc::now());
        if remaining >= self.refresh_threshold {
            debug!(remaining_secs = remaining.as_secs(), "Token refresh not needed yet");
            return RefreshOutcome::NotNeeded;
        }

        info!(remaining_secs = remaining.as_secs(), "Token nearing expiry, refreshing");
        self.refresh(Some(self.refresh_threshold)).await
    }

    /// Refresh now regardless of the remaining lifetime
    ///
    /// Respects the single-flight guard and applies the same failure policy
    /// as a scheduled refresh.
    #[instrument(skip(self))]
    pub async fn force_refresh(&self) -> RefreshOutcome {
        self.refresh(None).await
    }

    /// Remaining access token lifetime, zero when expired or logged out
    #[must_use]
    pub fn time_until_expiry(&self) -> Duration {
        self.client
            .stored_tokens()
            .map_or(Duration::ZERO, |tokens| tokens.time_until_expiry(Utc::now()))
    }

    /// Whether there is no currently valid access token
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.client.is_authenticated()
    }

    /// Refresh under the single-flight guard
    ///
    /// Tokens are read after the guard is held so a refresh that finished in
    /// the meantime is seen, along with any rotated refresh token. With a
    /// `threshold`, tokens that are fresh again are left alone.
    async fn refresh(&self, threshold: Option<Duration>) -> RefreshOutcome {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("Refresh already in flight, skipping");
            return RefreshOutcome::InFlight;
        };

        let Some(tokens) = self.client.stored_tokens() else {
            return RefreshOutcome::NoSession;
        };
        if threshold.is_some_and(|threshold| tokens.time_until_expiry(Utc::now()) >= threshold) {
            debug!("Tokens refreshed elsewhere, skipping");
            return RefreshOutcome::NotNeeded;
        }

        let Some(refresh_token) = tokens.refresh_token else {
            warn!("No refresh token available, forcing logout");
            return self.force_logout();
        };

        match self.client.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => {
                let expires_at = refreshed.expires_at;
                let _ = self.events.send(MonitorEvent::Refreshed { expires_at });
                RefreshOutcome::Refreshed { expires_at }
            }
            Err(e) => {
                warn!(error = %e, "Background token refresh failed, forcing logout");
                self.force_logout()
            }
        }
    }

    fn end_session(&self) -> RefreshOutcome {
        debug!("No stored tokens, stopping token refresh monitor");
        self.stop();
        let _ = self.events.send(MonitorEvent::SessionEnded);
        RefreshOutcome::NoSession
    }

    fn force_logout(&self) -> RefreshOutcome {
        let navigation = self.client.logout().unwrap_or_else(|e| {
            warn!(error = %e, "Forced logout could not clear all state");
            self.client.root_navigation()
        });
        self.stop();

        let _ = self.events.send(MonitorEvent::LoggedOut { navigation: navigation.clone() });
        RefreshOutcome::LoggedOut { navigation }
    }

    async fn run(monitor: Weak<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Token refresh loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(monitor) = monitor.upgrade() else {
                        break;
                    };
                    monitor.check_now().await;
                }
            }
        }
    }
}

impl MonitorTask {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for TokenRefreshMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for TokenRefreshMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("refresh_threshold", &self.refresh_threshold)
            .field("refreshing", &self.refreshing.load(Ordering::Relaxed))
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

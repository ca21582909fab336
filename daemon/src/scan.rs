/// One detection-and-act cycle: find the accept button, click it, let the client settle.
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info};

use crate::clicker::Clicker;
use crate::config::SettingsStore;
use crate::matcher::{locate_blocking, MatchResult, ScreenMatcher};

/// Pause after a click so the same button is not matched again before the client reacts.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Minimum spacing between two logged scan failures.
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(60);

/// Rate limiter for failure logs.  Only the log is suppressed; scanning continues.
#[derive(Debug)]
pub struct ErrorCooldown {
    last_reported: Option<Instant>,
    period: Duration,
}

impl ErrorCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            last_reported: None,
            period,
        }
    }

    /// Returns true when a failure seen at `now` should be logged, and records it.
    pub fn should_report(&mut self, now: Instant) -> bool {
        match self.last_reported {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last_reported = Some(now);
                true
            }
        }
    }
}

/// Runs single scan cycles against the accept-button image.
///
/// Cheap to clone; clones share the error cooldown so restarting a session does not
/// reopen the log floodgates.
#[derive(Clone)]
pub struct ScanLoop {
    matcher: Arc<dyn ScreenMatcher>,
    clicker: Arc<dyn Clicker>,
    settings: SettingsStore,
    cooldown: Arc<Mutex<ErrorCooldown>>,
    settle_delay: Duration,
}

impl ScanLoop {
    pub fn new(
        matcher: Arc<dyn ScreenMatcher>,
        clicker: Arc<dyn Clicker>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            matcher,
            clicker,
            settings,
            cooldown: Arc::new(Mutex::new(ErrorCooldown::new(ERROR_COOLDOWN))),
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Performs one cycle.  Returns true iff a click was dispatched.
    ///
    /// The click only happens after the lookup has been awaited, so a session aborted
    /// mid-lookup never clicks.
    pub async fn scan_once(&self) -> bool {
        let snapshot = self.settings.load();
        let image = self.settings.resolve(&snapshot.images.accept_button);
        let located =
            locate_blocking(Arc::clone(&self.matcher), image, snapshot.confidence()).await;

        match located {
            MatchResult::Found(region) => {
                let (x, y) = region.center();
                if let Err(e) = self.clicker.click(x, y) {
                    self.report_failure(format_args!("Failed to click accept button: {e:#}"));
                    return false;
                }
                info!(x, y, "Clicked accept button");
                sleep(self.settle_delay).await;
                true
            }
            MatchResult::NotFound => false,
            MatchResult::TransientError(e) => {
                self.report_failure(format_args!("Scan failed: {e}"));
                false
            }
        }
    }

    fn report_failure(&self, message: impl Display) {
        let mut cooldown = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
        if cooldown.should_report(Instant::now()) {
            error!("{message}");
        }
    }
}

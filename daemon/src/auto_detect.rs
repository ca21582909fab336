use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::controller::SessionController;
use crate::matcher::{locate_blocking, MatchError, MatchResult, ScreenMatcher};

/// Pause while the match-found reference image is absent from disk.
pub const MISSING_IMAGE_PAUSE: Duration = Duration::from_secs(5);
/// Extra pause after the matcher itself reports the image as missing.
pub const NOT_FOUND_BACKOFF: Duration = Duration::from_secs(10);
/// Extra pause after any other matcher failure.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Minimum time spent idle after a stop before detection may start monitoring again.
pub const AUTO_START_DWELL: Duration = Duration::from_secs(10);

/// Watches for the matchmaking "match found" screen and asks the controller to start
/// monitoring when it shows up.
///
/// Never touches the monitoring flag itself: a `start` that loses a race with the
/// window or tray is simply a no-op.
pub struct AutoDetectSession {
    controller: Arc<SessionController>,
    matcher: Arc<dyn ScreenMatcher>,
    dwell: Duration,
}

impl AutoDetectSession {
    pub fn new(controller: Arc<SessionController>, matcher: Arc<dyn ScreenMatcher>) -> Self {
        Self {
            controller,
            matcher,
            dwell: AUTO_START_DWELL,
        }
    }

    /// Polls until the controller shuts down.
    pub async fn run(self) {
        let mut shutdown = self.controller.shutdown_signal();
        info!("Auto-detect watching for the match found screen");

        while self.controller.is_running() {
            let settings = self.controller.settings();
            let image = settings.matching_screen_path();
            if !image.exists() {
                debug!("Match found image {} is missing", image.display());
                if !pause(&mut shutdown, MISSING_IMAGE_PAUSE).await {
                    break;
                }
                continue;
            }

            let options = self.controller.options();
            let eligible = !self.controller.is_monitoring()
                && options.auto_start()
                && self.controller.idle_longer_than(self.dwell);

            if eligible {
                let confidence = settings.load().confidence();
                let located = locate_blocking(Arc::clone(&self.matcher), image, confidence).await;
                let backoff = match located {
                    MatchResult::Found(region) => {
                        info!(x = region.x, y = region.y, "Match found screen detected");
                        if let Err(e) = self.controller.start().await {
                            error!("Auto-start failed: {e:#}");
                        }
                        None
                    }
                    MatchResult::NotFound => None,
                    MatchResult::TransientError(e @ MatchError::ImageNotFound(_)) => {
                        error!("Auto-detect failed: {e}");
                        Some(NOT_FOUND_BACKOFF)
                    }
                    MatchResult::TransientError(e) => {
                        error!("Auto-detect failed: {e:?}");
                        Some(ERROR_BACKOFF)
                    }
                };
                // The regular interval still follows a backoff.
                if let Some(backoff) = backoff {
                    if !pause(&mut shutdown, backoff).await {
                        break;
                    }
                }
            }

            let interval = settings.load().interval();
            if !pause(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Auto-detect finished");
    }
}

/// Sleeps for `duration`.  Returns false if shutdown was signalled first.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = sleep(duration) => true,
        _ = shutdown.wait_for(|done| *done) => false,
    }
}

/// Single authority over "is monitoring active".
///
/// Window, tray and auto-detect all go through [`SessionController`].  `start`, `stop`
/// and the session's own auto-stop are linearized by one async mutex, so concurrent
/// callers never spawn two scan tasks and observers see every transition exactly once,
/// in order, after the flags have changed.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use anyhow::Result;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::clicker::Clicker;
use crate::config::SettingsStore;
use crate::matcher::ScreenMatcher;
use crate::scan::ScanLoop;
use crate::session::MonitorSession;

/// How long `stop` waits for the scan task before abandoning it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);
/// Stop reason reported when a click ended the session.
pub const AUTO_STOP_MESSAGE: &str = "Accepted - stopped";

/// Receives monitoring transitions.  Called with controller state locked: implementations
/// must only record or forward the event, never call back into the controller.
pub trait SessionObserver: Send + Sync {
    fn on_started(&self);
    fn on_stopped(&self, reason: Option<&str>);
    /// Informational status text that does not change the monitoring state.
    fn on_notice(&self, _text: &str) {}
    /// The process is exiting; tear down presentation.
    fn on_exit(&self) {}
}

/// User toggles that shape session behaviour.
#[derive(Debug)]
pub struct SessionOptions {
    auto_stop: AtomicBool,
    auto_start: AtomicBool,
}

impl SessionOptions {
    pub fn new(auto_stop: bool, auto_start: bool) -> Self {
        Self {
            auto_stop: AtomicBool::new(auto_stop),
            auto_start: AtomicBool::new(auto_start),
        }
    }

    /// End the session after a successful click.
    pub fn auto_stop(&self) -> bool {
        self.auto_stop.load(Ordering::Relaxed)
    }

    pub fn set_auto_stop(&self, enabled: bool) {
        self.auto_stop.store(enabled, Ordering::Relaxed);
    }

    /// Let auto-detect start monitoring when the match-found screen appears.
    pub fn auto_start(&self) -> bool {
        self.auto_start.load(Ordering::Relaxed)
    }

    pub fn set_auto_start(&self, enabled: bool) {
        self.auto_start.store(enabled, Ordering::Relaxed);
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[derive(Default)]
struct ControllerState {
    active: Option<MonitorSession>,
}

pub struct SessionController {
    scan: ScanLoop,
    options: Arc<SessionOptions>,
    state: AsyncMutex<ControllerState>,
    /// Mirrors `state.active.is_some()` for lock-free reads; written under `state`.
    monitoring: AtomicBool,
    /// Process-wide liveness; flips to false once, in `exit`.
    running: AtomicBool,
    next_session_id: AtomicU64,
    last_stopped: Mutex<Option<Instant>>,
    observers: Mutex<Vec<Arc<dyn SessionObserver>>>,
    shutdown_tx: watch::Sender<bool>,
    me: Weak<SessionController>,
}

impl SessionController {
    pub fn new(
        settings: SettingsStore,
        matcher: Arc<dyn ScreenMatcher>,
        clicker: Arc<dyn Clicker>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new_cyclic(|me| Self {
            scan: ScanLoop::new(matcher, clicker, settings),
            options: Arc::new(SessionOptions::default()),
            state: AsyncMutex::new(ControllerState::default()),
            monitoring: AtomicBool::new(false),
            running: AtomicBool::new(true),
            next_session_id: AtomicU64::new(1),
            last_stopped: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            shutdown_tx,
            me: me.clone(),
        })
    }

    pub fn settings(&self) -> &SettingsStore {
        self.scan.settings()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn register_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Resolves to `true` once `exit` has run.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// True when idle and at least `dwell` has passed since the last stop.
    pub fn idle_longer_than(&self, dwell: Duration) -> bool {
        if self.is_monitoring() {
            return false;
        }
        let last = *self
            .last_stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.map_or(true, |stopped| stopped.elapsed() >= dwell)
    }

    /// Starts a monitoring session unless one is already active.
    ///
    /// Returns `Ok(true)` only for the call that actually spawned the session; concurrent
    /// and repeated calls return `Ok(false)`.  Spawn failures are returned and leave the
    /// controller idle.
    pub async fn start(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !self.is_running() {
            debug!("Ignoring start request during shutdown");
            return Ok(false);
        }
        if state.active.is_some() {
            return Ok(false);
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.monitoring.store(true, Ordering::SeqCst);
        let session = match MonitorSession::spawn(
            id,
            self.scan.clone(),
            Arc::clone(&self.options),
            self.me.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                self.monitoring.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        state.active = Some(session);

        info!(session = id, "Monitoring started");
        self.notify(|o| o.on_started());
        Ok(true)
    }

    /// Stops the active session, waiting up to [`STOP_TIMEOUT`] for it to wind down.
    /// Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.active.take() else {
            return false;
        };
        let id = session.id();
        self.monitoring.store(false, Ordering::SeqCst);
        session.stop(STOP_TIMEOUT).await;
        self.mark_stopped();

        info!(session = id, "Monitoring stopped");
        self.notify(|o| o.on_stopped(None));
        true
    }

    /// Ends the whole process lifecycle.  Only the first call has any effect.
    pub async fn exit(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down");
        self.stop().await;
        self.notify(|o| o.on_exit());
        self.shutdown_tx.send_replace(true);
    }

    /// Called by session `id` from its own task when it ends itself after a click.
    ///
    /// Gives up as soon as the session's stop signal fires: a concurrent `stop` holds the
    /// state lock while waiting for this very task, and will report the transition itself.
    pub(crate) async fn finish_session(
        &self,
        id: u64,
        reason: &str,
        stop_rx: &mut watch::Receiver<bool>,
    ) {
        let mut state = tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stop| *stop) => return,
            state = self.state.lock() => state,
        };
        if state.active.as_ref().map(MonitorSession::id) != Some(id) {
            return;
        }
        // Dropping our own handle detaches it; this task returns right after.
        state.active = None;
        self.monitoring.store(false, Ordering::SeqCst);
        self.mark_stopped();

        info!(session = id, "{reason}");
        self.notify(|o| o.on_stopped(Some(reason)));
    }

    /// Shows `text` on every presentation surface.
    pub fn announce(&self, text: &str) {
        self.notify(|o| o.on_notice(text));
    }

    fn mark_stopped(&self) {
        *self
            .last_stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn notify(&self, f: impl Fn(&dyn SessionObserver)) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }
}

/// Background scan task for a single monitoring session.
///
/// A `MonitorSession` is spawned by [`SessionController::start`] and runs
/// [`ScanLoop::scan_once`] on the configured cadence until it is told to stop or, with
/// auto-stop enabled, until a click lands.  Stopping is cooperative: the stop signal is
/// honoured between cycles, never in the middle of one.
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::controller::{SessionController, SessionOptions, AUTO_STOP_MESSAGE};
use crate::scan::ScanLoop;

/// A running scan task.
pub struct MonitorSession {
    id: u64,
    /// Setting this to `true` asks the task to finish after its current cycle.
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorSession {
    /// Spawns the scan task on the current runtime.
    pub fn spawn(
        id: u64,
        scan: ScanLoop,
        options: Arc<SessionOptions>,
        controller: Weak<SessionController>,
    ) -> Result<Self> {
        let runtime =
            Handle::try_current().context("Monitoring requires a running async runtime")?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run(id, scan, options, controller, stop_rx));
        Ok(Self {
            id,
            stop_tx,
            handle,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Signals the task and waits up to `timeout` for it to finish.
    ///
    /// Returns false when the timeout elapsed; the task is then aborted at its next
    /// suspension point.
    pub async fn stop(self, timeout: Duration) -> bool {
        let MonitorSession {
            id,
            stop_tx,
            mut handle,
        } = self;
        let _ = stop_tx.send(true);
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(session = id, "Monitor session did not stop within {timeout:?}; abandoning it");
                handle.abort();
                false
            }
        }
    }
}

async fn run(
    id: u64,
    scan: ScanLoop,
    options: Arc<SessionOptions>,
    controller: Weak<SessionController>,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(session = id, "Watching for the accept button");
    loop {
        if *stop_rx.borrow() {
            break;
        }

        let clicked = scan.scan_once().await;
        if clicked && options.auto_stop() {
            if let Some(controller) = controller.upgrade() {
                controller
                    .finish_session(id, AUTO_STOP_MESSAGE, &mut stop_rx)
                    .await;
            }
            break;
        }

        // Re-read every cycle so a settings reload changes the cadence.
        let interval = scan.settings().load().interval();
        tokio::select! {
            _ = sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }
    debug!(session = id, "Monitor session finished");
}

/// Test doubles shared by the session, controller and auto-detect tests.
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::clicker::Clicker;
use crate::config::{Settings, SettingsStore};
use crate::controller::{SessionController, SessionObserver};
use crate::matcher::{MatchResult, ScreenMatcher};

/// Replays a fixed sequence of results, then answers `fallback` forever.
///
/// With `for_path`, only lookups of that image consume the script; every other
/// image is reported as not found.
pub struct ScriptedMatcher {
    script: Mutex<VecDeque<MatchResult>>,
    fallback: MatchResult,
    only: Option<PathBuf>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedMatcher {
    pub fn new(script: impl IntoIterator<Item = MatchResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: MatchResult::NotFound,
            only: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(result: MatchResult) -> Self {
        Self {
            fallback: result,
            ..Self::new(std::iter::empty())
        }
    }

    pub fn for_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.only = Some(path.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

impl ScreenMatcher for ScriptedMatcher {
    fn locate(&self, template: &Path, _confidence: f32) -> MatchResult {
        self.calls.lock().unwrap().push(template.to_path_buf());
        if self.only.as_deref().is_some_and(|p| p != template) {
            return MatchResult::NotFound;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Blocks the calling thread for `delay` on every lookup, then answers `result`.
pub struct SlowMatcher {
    delay: Duration,
    result: MatchResult,
    entered: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowMatcher {
    pub fn new(delay: Duration, result: MatchResult) -> Self {
        Self {
            delay,
            result,
            entered: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ScreenMatcher for SlowMatcher {
    fn locate(&self, _template: &Path, _confidence: f32) -> MatchResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

#[derive(Default)]
pub struct RecordingClicker {
    clicks: Mutex<Vec<(i32, i32)>>,
    fail: bool,
}

impl RecordingClicker {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().clone()
    }
}

impl Clicker for RecordingClicker {
    fn click(&self, x: i32, y: i32) -> Result<()> {
        if self.fail {
            bail!("input device unavailable");
        }
        self.clicks.lock().unwrap().push((x, y));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    started: AtomicUsize,
    exits: AtomicUsize,
    stopped: Mutex<Vec<Option<String>>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> Vec<Option<String>> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stopped(&self, reason: Option<&str>) {
        self.stopped.lock().unwrap().push(reason.map(str::to_string));
    }

    fn on_notice(&self, text: &str) {
        self.notices.lock().unwrap().push(text.to_string());
    }

    fn on_exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Settings rooted at `base` with the given interval; nothing is read from disk.
pub fn settings_in(base: &Path, interval_sec: f64) -> SettingsStore {
    let mut settings = Settings::default();
    settings.template_matching.interval_sec = interval_sec;
    SettingsStore::new(base.to_path_buf(), base.join("config.json"), settings)
}

/// Controller wired to test doubles with one recording observer attached.
pub fn controller_with(
    matcher: Arc<ScriptedMatcher>,
    clicker: Arc<RecordingClicker>,
    settings: SettingsStore,
) -> (Arc<SessionController>, Arc<RecordingObserver>) {
    let controller = SessionController::new(settings, matcher, clicker);
    let observer = Arc::new(RecordingObserver::default());
    controller.register_observer(observer.clone());
    (controller, observer)
}

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// Drives `future` to completion on the current thread with no tokio runtime entered.
pub fn block_on_without_runtime<F: Future>(future: F) -> F::Output {
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => thread::park(),
        }
    }
}

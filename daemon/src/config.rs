use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::event::Command;

pub const DEFAULT_ACCEPT_BUTTON_IMAGE: &str = "accept_button.png";
pub const DEFAULT_MATCHING_SCREEN_IMAGE: &str = "matching.png";
pub const DEFAULT_CONFIDENCE: f32 = 0.7;
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;

/// Root settings structure. Deserialized from `<base>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub images: ImageSettings,
    #[serde(default)]
    pub template_matching: MatchingSettings,
}

/// Reference images, relative to the base directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// The matchmaking "accept" button that gets clicked.
    #[serde(default = "default_accept_button")]
    pub accept_button: PathBuf,
    /// The "match found" screen that triggers automatic monitoring.
    #[serde(default = "default_matching_screen")]
    pub matching_screen: PathBuf,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            accept_button: default_accept_button(),
            matching_screen: default_matching_screen(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Similarity threshold in (0, 1]. A score equal to the threshold matches.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Delay between scan cycles, in seconds.
    #[serde(default = "default_interval")]
    pub interval_sec: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            interval_sec: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl Settings {
    /// Replaces out-of-range values with their defaults.
    pub fn validated(mut self) -> Self {
        let confidence = self.template_matching.confidence;
        if !confidence.is_finite() || confidence <= 0.0 || confidence > 1.0 {
            warn!(confidence, "Confidence must be in (0, 1]; using {DEFAULT_CONFIDENCE}");
            self.template_matching.confidence = DEFAULT_CONFIDENCE;
        }
        let interval = self.template_matching.interval_sec;
        if interval <= 0.0 || Duration::try_from_secs_f64(interval).is_err() {
            warn!(interval, "Scan interval must be a positive number of seconds; using {DEFAULT_INTERVAL_SECS}s");
            self.template_matching.interval_sec = DEFAULT_INTERVAL_SECS;
        }
        self
    }

    pub fn confidence(&self) -> f32 {
        self.template_matching.confidence
    }

    /// Falls back to the default for values `validated` would have replaced.
    pub fn interval(&self) -> Duration {
        match Duration::try_from_secs_f64(self.template_matching.interval_sec) {
            Ok(interval) if !interval.is_zero() => interval,
            _ => Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
        }
    }
}

/// Reads and parses the settings file at `path`.
pub fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
    Ok(settings.validated())
}

/// Writes `settings` to `path` as pretty-printed JSON, replacing any existing file.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))
}

/// Loads the settings at `path`. When the file is missing or unparsable the default
/// settings are written to `path` and returned. Never fails: write errors are logged.
pub fn load_or_default(path: &Path) -> Settings {
    if path.exists() {
        match read_settings(path) {
            Ok(settings) => return settings,
            Err(e) => error!("{e:#}"),
        }
    }
    let settings = Settings::default();
    match save_settings(path, &settings) {
        Ok(()) => info!("Wrote default settings to {}", path.display()),
        Err(e) => error!("Failed to write default settings: {e:#}"),
    }
    settings
}

/// Shared, atomically swappable view of the current settings.
///
/// Readers take one [`SettingsStore::load`] snapshot per cycle so a reload never produces
/// a torn read across fields.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    base_dir: PathBuf,
    path: PathBuf,
    current: ArcSwap<Settings>,
}

impl SettingsStore {
    pub fn new(base_dir: PathBuf, path: PathBuf, settings: Settings) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                base_dir,
                path,
                current: ArcSwap::from_pointee(settings),
            }),
        }
    }

    pub fn load(&self) -> Arc<Settings> {
        self.inner.current.load_full()
    }

    pub fn replace(&self, settings: Settings) {
        self.inner.current.store(Arc::new(settings));
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Resolves an image path from the settings against the base directory.
    pub fn resolve(&self, image: &Path) -> PathBuf {
        self.inner.base_dir.join(image)
    }

    pub fn accept_button_path(&self) -> PathBuf {
        self.resolve(&self.load().images.accept_button)
    }

    pub fn matching_screen_path(&self) -> PathBuf {
        self.resolve(&self.load().images.matching_screen)
    }

    /// Re-reads the settings file (writing defaults if it is unusable) and swaps it in.
    pub fn reload(&self) {
        self.replace(load_or_default(&self.inner.path));
        info!("Settings reloaded from {}", self.inner.path.display());
    }

    /// Writes the current snapshot back to the settings file.
    pub fn save(&self) -> Result<()> {
        save_settings(&self.inner.path, &self.load())?;
        info!("Settings saved to {}", self.inner.path.display());
        Ok(())
    }
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the settings
/// file is created or modified and still parses, sends a `SettingsChanged` command.
pub async fn watch_config(path: PathBuf, tx: mpsc::UnboundedSender<Command>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create settings watcher: {e}");
            return;
        }
    };

    // Watch the directory so editor-style atomic saves (write-new + rename) are seen.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!("Settings path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("Failed to watch settings directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );
        if !(affects_config && is_write) {
            continue;
        }
        match read_settings(&path) {
            Ok(settings) => {
                if tx.send(Command::SettingsChanged(settings)).is_err() {
                    break;
                }
            }
            // Half-written or hand-edited files are left alone.
            Err(e) => warn!("Ignoring settings change: {e:#}"),
        }
    }
}

fn default_accept_button() -> PathBuf {
    PathBuf::from(DEFAULT_ACCEPT_BUTTON_IMAGE)
}

fn default_matching_screen() -> PathBuf {
    PathBuf::from(DEFAULT_MATCHING_SCREEN_IMAGE)
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_SECS
}

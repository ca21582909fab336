/// System tray icon with the Open / Start / Stop / Exit menu.
///
/// Tray objects are not `Send` and must live on the thread that runs the UI event loop.
/// Menu clicks arrive on a global handler and are turned into [`TrayAction`]s.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tray_icon::menu::{
    CheckMenuItem, Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem,
};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
use tracing::{info, warn};

use crate::event::Command;
use crate::paths;

const TOOLTIP: &str = "LoL Auto Accept";
const OPEN_ID: &str = "open";
const START_ID: &str = "start";
const STOP_ID: &str = "stop";
const EXIT_ID: &str = "exit";

/// Edge length of the generated fallback icon.
const FALLBACK_ICON_SIZE: u32 = 32;
/// League gold.
const FALLBACK_ICON_COLOR: [u8; 4] = [200, 155, 60, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    Open,
    Start,
    Stop,
    Exit,
}

impl TrayAction {
    /// Command-loop request for this action.  `Open` is handled by the UI itself.
    pub fn command(self) -> Option<Command> {
        match self {
            TrayAction::Open => None,
            TrayAction::Start => Some(Command::Start),
            TrayAction::Stop => Some(Command::Stop),
            TrayAction::Exit => Some(Command::Exit),
        }
    }
}

/// Maps a menu item id back to its action.  Ids from other menus yield `None`.
pub fn action_for(id: &MenuId) -> Option<TrayAction> {
    match id.0.as_str() {
        OPEN_ID => Some(TrayAction::Open),
        START_ID => Some(TrayAction::Start),
        STOP_ID => Some(TrayAction::Stop),
        EXIT_ID => Some(TrayAction::Exit),
        _ => None,
    }
}

/// Routes tray menu clicks to `handler`.  Replaces any previously installed handler.
pub fn set_action_handler(handler: impl Fn(TrayAction) + Send + Sync + 'static) {
    MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
        if let Some(action) = action_for(&event.id) {
            handler(action);
        }
    }));
}

/// Decoded RGBA icon pixels, shared by the tray and the window.
#[derive(Debug, Clone)]
pub struct IconImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl IconImage {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to open icon {}", path.display()))?
            .into_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            rgba: image.into_raw(),
            width,
            height,
        })
    }

    /// A solid square used when no icon file can be loaded.
    pub fn fallback() -> Self {
        let pixels = (FALLBACK_ICON_SIZE * FALLBACK_ICON_SIZE) as usize;
        Self {
            rgba: FALLBACK_ICON_COLOR.repeat(pixels),
            width: FALLBACK_ICON_SIZE,
            height: FALLBACK_ICON_SIZE,
        }
    }

    /// `resources/tray_icon.png`, else the first `.png` in `resources/`, else the
    /// generated square.
    pub fn load(base: &Path) -> Self {
        for candidate in icon_candidates(base) {
            match Self::open(&candidate) {
                Ok(icon) => {
                    info!("Loaded tray icon from {}", candidate.display());
                    return icon;
                }
                Err(e) => warn!("{e:#}"),
            }
        }
        warn!("No usable tray icon found; using a generated one");
        Self::fallback()
    }

    fn to_tray_icon(&self) -> Result<Icon> {
        Icon::from_rgba(self.rgba.clone(), self.width, self.height)
            .context("Invalid tray icon data")
    }
}

/// Icon files to try, in order of preference.
fn icon_candidates(base: &Path) -> Vec<PathBuf> {
    let preferred = paths::tray_icon_path(base);
    let mut others: Vec<PathBuf> = std::fs::read_dir(paths::resources_dir(base))
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
                })
                .filter(|p| *p != preferred)
                .collect()
        })
        .unwrap_or_default();
    others.sort();

    let mut candidates = Vec::with_capacity(others.len() + 1);
    if preferred.is_file() {
        candidates.push(preferred);
    }
    candidates.extend(others);
    candidates
}

/// The live tray icon and handles to its mutable menu items.
pub struct Tray {
    _icon: TrayIcon,
    start: CheckMenuItem,
    stop: CheckMenuItem,
}

impl Tray {
    /// Builds the tray icon.  `with_window` enables the Open item.
    pub fn new(icon: &IconImage, with_window: bool) -> Result<Self> {
        let open = MenuItem::with_id(OPEN_ID, "Open", with_window, None);
        let start = CheckMenuItem::with_id(START_ID, "Start", true, false, None);
        let stop = CheckMenuItem::with_id(STOP_ID, "Stop", true, true, None);
        let exit = MenuItem::with_id(EXIT_ID, "Exit", true, None);

        let menu = Menu::new();
        menu.append_items(&[
            &open,
            &PredefinedMenuItem::separator(),
            &start,
            &stop,
            &PredefinedMenuItem::separator(),
            &exit,
        ])
        .context("Failed to build tray menu")?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(TOOLTIP)
            .with_icon(icon.to_tray_icon()?)
            .build()
            .context("Failed to create tray icon")?;

        Ok(Self {
            _icon: tray,
            start,
            stop,
        })
    }

    /// Start is checked while monitoring, Stop while idle.
    pub fn set_monitoring(&self, monitoring: bool) {
        let (start, stop) = check_states(monitoring);
        self.start.set_checked(start);
        self.stop.set_checked(stop);
    }
}

fn check_states(monitoring: bool) -> (bool, bool) {
    (monitoring, !monitoring)
}

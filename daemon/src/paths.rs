/// Canonical file locations for the auto-accept tool.
///
/// Everything lives under a single base directory:
///   - config.json                Settings, read at startup and rewritten on save.
///   - accept_button.png etc.     Reference images named relative to the base directory.
///   - resources/tray_icon.png    Tray and window icon.
use std::path::{Path, PathBuf};

/// Overrides the base directory when set (useful when running from a build tree).
pub const HOME_ENV_VAR: &str = "LOL_AUTO_ACCEPT_HOME";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const RESOURCES_DIR_NAME: &str = "resources";
pub const TRAY_ICON_FILE_NAME: &str = "tray_icon.png";

/// Returns the base directory: `$LOL_AUTO_ACCEPT_HOME`, else the directory holding the
/// executable, else the current working directory.
pub fn app_base_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the full path to the settings file inside `base`.
pub fn config_file_path(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE_NAME)
}

pub fn resources_dir(base: &Path) -> PathBuf {
    base.join(RESOURCES_DIR_NAME)
}

/// Returns the full path to the tray icon: `<base>/resources/tray_icon.png`
pub fn tray_icon_path(base: &Path) -> PathBuf {
    resources_dir(base).join(TRAY_ICON_FILE_NAME)
}

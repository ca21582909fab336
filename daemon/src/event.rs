use crate::config::Settings;

/// Requests consumed by the command loop in `main`.
#[derive(Debug)]
pub enum Command {
    /// Window or tray asked to start monitoring.
    Start,
    /// Window or tray asked to stop monitoring.
    Stop,
    /// The settings file changed on disk and was successfully re-parsed.
    SettingsChanged(Settings),
    /// Exit menu item, Exit button or Ctrl+C: unwind everything and quit.
    Exit,
}

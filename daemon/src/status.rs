use chrono::{DateTime, Local};

pub const IDLE_TEXT: &str = "Idle";
pub const MONITORING_TEXT: &str = "Monitoring...";
pub const STOPPED_TEXT: &str = "Stopped";
pub const RELOADED_TEXT: &str = "Settings reloaded";
pub const SAVED_TEXT: &str = "Settings saved";

/// Whether a monitoring session is active, as last reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Monitoring,
}

/// Colour family for the status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Normal,
    Active,
    Info,
}

/// What the window and tray display.  Only ever mutated on the UI thread.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub tone: StatusTone,
    pub message: String,
    /// Local time of the last change, shown next to the message.
    pub changed_at: DateTime<Local>,
}

impl MonitorStatus {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Idle,
            tone: StatusTone::Normal,
            message: IDLE_TEXT.to_string(),
            changed_at: Local::now(),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == MonitorState::Monitoring
    }

    pub fn started(&mut self) {
        self.state = MonitorState::Monitoring;
        self.set(StatusTone::Active, MONITORING_TEXT);
    }

    /// `reason` is set when the session ended itself, e.g. after accepting.
    pub fn stopped(&mut self, reason: Option<&str>) {
        self.state = MonitorState::Idle;
        self.set(StatusTone::Normal, reason.unwrap_or(STOPPED_TEXT));
    }

    /// Transient notice that does not change the monitoring state.
    pub fn info(&mut self, message: &str) {
        self.set(StatusTone::Info, message);
    }

    /// `HH:MM:SS` of the last change.
    pub fn changed_at_label(&self) -> String {
        self.changed_at.format("%H:%M:%S").to_string()
    }

    fn set(&mut self, tone: StatusTone, message: &str) {
        self.tone = tone;
        self.message = message.to_string();
        self.changed_at = Local::now();
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self::new()
    }
}

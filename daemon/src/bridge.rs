/// Hands controller transitions to the UI thread.
///
/// Observers run on whichever task caused the transition, so they never touch widgets.
/// [`UiBridge`] turns each transition into a [`UiMessage`] and posts it through a
/// caller-supplied function: an `mpsc` sender plus repaint request in GUI mode, or a
/// `tao` event-loop proxy in headless mode.
use std::sync::Arc;

use crate::controller::SessionObserver;
use crate::status::MonitorStatus;

/// Work item for the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiMessage {
    Started,
    Stopped(Option<String>),
    /// Informational status text, e.g. after a settings reload.
    Notice(String),
    /// Bring the window to the front.
    Show,
    /// Tear down presentation and leave the UI loop.
    Quit,
}

impl UiMessage {
    /// Applies the message to `status`.  Returns false for messages that are not status
    /// updates.
    pub fn apply_to(&self, status: &mut MonitorStatus) -> bool {
        match self {
            UiMessage::Started => status.started(),
            UiMessage::Stopped(reason) => status.stopped(reason.as_deref()),
            UiMessage::Notice(text) => status.info(text),
            UiMessage::Show | UiMessage::Quit => return false,
        }
        true
    }
}

type Post = dyn Fn(UiMessage) + Send + Sync;

/// [`SessionObserver`] that forwards every transition as a [`UiMessage`].
#[derive(Clone)]
pub struct UiBridge {
    post: Arc<Post>,
}

impl UiBridge {
    pub fn new(post: impl Fn(UiMessage) + Send + Sync + 'static) -> Self {
        Self {
            post: Arc::new(post),
        }
    }

    pub fn post(&self, message: UiMessage) {
        (self.post)(message);
    }
}

impl SessionObserver for UiBridge {
    fn on_started(&self) {
        self.post(UiMessage::Started);
    }

    fn on_stopped(&self, reason: Option<&str>) {
        self.post(UiMessage::Stopped(reason.map(str::to_string)));
    }

    fn on_notice(&self, text: &str) {
        self.post(UiMessage::Notice(text.to_string()));
    }

    fn on_exit(&self) {
        self.post(UiMessage::Quit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::mpsc;

    use crate::controller::AUTO_STOP_MESSAGE;
    use crate::matcher::MatchResult;
    use crate::status::{MonitorState, STOPPED_TEXT};
    use crate::testing::{controller_with, settings_in, RecordingClicker, ScriptedMatcher};

    fn channel_bridge() -> (UiBridge, mpsc::Receiver<UiMessage>) {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let bridge = UiBridge::new(move |message| {
            let _ = tx.lock().unwrap().send(message);
        });
        (bridge, rx)
    }

    // ── SessionObserver ───────────────────────────────────────────────────────

    #[test]
    fn observer_callbacks_become_messages() {
        let (bridge, rx) = channel_bridge();
        bridge.on_started();
        bridge.on_stopped(Some(AUTO_STOP_MESSAGE));
        bridge.on_stopped(None);
        bridge.on_notice("Settings reloaded");
        bridge.on_exit();

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            messages,
            vec![
                UiMessage::Started,
                UiMessage::Stopped(Some(AUTO_STOP_MESSAGE.to_string())),
                UiMessage::Stopped(None),
                UiMessage::Notice("Settings reloaded".to_string()),
                UiMessage::Quit,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn controller_transitions_arrive_in_order() {
        let (bridge, rx) = channel_bridge();
        let (controller, _observer) = controller_with(
            Arc::new(ScriptedMatcher::always(MatchResult::NotFound)),
            Arc::new(RecordingClicker::default()),
            settings_in(Path::new("/base"), 1.0),
        );
        controller.register_observer(Arc::new(bridge));

        controller.start().await.unwrap();
        controller.stop().await;
        controller.start().await.unwrap();
        controller.announce("Settings reloaded");
        controller.exit().await;

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            messages,
            vec![
                UiMessage::Started,
                UiMessage::Stopped(None),
                UiMessage::Started,
                UiMessage::Notice("Settings reloaded".to_string()),
                UiMessage::Stopped(None),
                UiMessage::Quit,
            ]
        );
    }

    // ── apply_to ──────────────────────────────────────────────────────────────

    #[test]
    fn status_follows_messages() {
        let mut status = MonitorStatus::new();

        assert!(UiMessage::Started.apply_to(&mut status));
        assert_eq!(status.state, MonitorState::Monitoring);

        assert!(UiMessage::Notice("Settings saved".into()).apply_to(&mut status));
        assert_eq!(status.state, MonitorState::Monitoring);
        assert_eq!(status.message, "Settings saved");

        assert!(UiMessage::Stopped(None).apply_to(&mut status));
        assert_eq!(status.state, MonitorState::Idle);
        assert_eq!(status.message, STOPPED_TEXT);
    }

    #[test]
    fn control_messages_leave_status_alone() {
        let mut status = MonitorStatus::new();
        status.started();
        assert!(!UiMessage::Show.apply_to(&mut status));
        assert!(!UiMessage::Quit.apply_to(&mut status));
        assert!(status.is_monitoring());
    }
}

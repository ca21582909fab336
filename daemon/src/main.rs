mod auto_detect;
mod bridge;
mod capture;
mod clicker;
mod config;
mod controller;
mod event;
mod matcher;
mod paths;
mod scan;
mod session;
mod status;
#[cfg(test)]
mod testing;
mod tray;
mod window;

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use eframe::egui;
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoopBuilder};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::auto_detect::AutoDetectSession;
use crate::bridge::{UiBridge, UiMessage};
use crate::capture::ScreenTemplateMatcher;
use crate::clicker::MouseClicker;
use crate::config::SettingsStore;
use crate::controller::SessionController;
use crate::event::Command;
use crate::matcher::ScreenMatcher;
use crate::status::{MonitorStatus, RELOADED_TEXT};
use crate::tray::{IconImage, Tray};
use crate::window::MonitorWindow;

/// Clicks the League of Legends "Accept" button when a match is found.
#[derive(Parser, Debug)]
#[command(name = "lol-auto-accept", version, about)]
struct Cli {
    /// Run with only a tray icon and start monitoring immediately.
    #[arg(long)]
    nogui: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(cli: Cli) -> Result<()> {
    // ── Base directory & settings ─────────────────────────────────────────────
    let base = paths::app_base_dir();
    info!(
        "lol-auto-accept v{} starting in {}",
        env!("CARGO_PKG_VERSION"),
        base.display()
    );
    let config_path = paths::config_file_path(&base);
    let settings = SettingsStore::new(
        base.clone(),
        config_path.clone(),
        config::load_or_default(&config_path),
    );

    let accept_button = settings.accept_button_path();
    if !accept_button.is_file() {
        bail!(
            "Accept button image not found at {}; nothing to look for",
            accept_button.display()
        );
    }

    // ── Runtime & controller ──────────────────────────────────────────────────
    // The UI event loop needs the main thread, so the runtime is built by hand.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let matcher: Arc<dyn ScreenMatcher> = Arc::new(ScreenTemplateMatcher::new());
    let controller = SessionController::new(settings, Arc::clone(&matcher), Arc::new(MouseClicker));
    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();

    // ── Background tasks ──────────────────────────────────────────────────────
    runtime.spawn(config::watch_config(config_path, command_tx.clone()));
    runtime.spawn(run_commands(Arc::clone(&controller), command_rx));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = command_tx.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                let _ = tx.send(Command::Exit);
            }
        });
    }

    let icon = IconImage::load(&base);
    if cli.nogui {
        run_headless(runtime, controller, command_tx, icon);
    }

    runtime.spawn(AutoDetectSession::new(Arc::clone(&controller), matcher).run());
    run_window(Arc::clone(&controller), command_tx, icon)?;

    // The window is gone; make sure nothing keeps clicking.
    runtime.block_on(controller.exit());
    Ok(())
}

/// Runs the desktop window (and its tray icon) until it closes.
fn run_window(
    controller: Arc<SessionController>,
    commands: UnboundedSender<Command>,
    icon: IconImage,
) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(window::WINDOW_TITLE)
            .with_inner_size([340.0, 260.0])
            .with_min_inner_size([280.0, 220.0])
            .with_icon(window::icon_data(&icon)),
        ..Default::default()
    };

    eframe::run_native(
        window::WINDOW_TITLE,
        options,
        Box::new(move |cc| Ok(Box::new(MonitorWindow::new(cc, controller, commands, &icon)))),
    )
    .map_err(|e| anyhow!("{e}"))
}

/// Tray-only mode: monitoring starts at once and auto-stop/auto-start stay off.
/// Never returns; the process ends when the tray loop exits.
fn run_headless(
    runtime: Runtime,
    controller: Arc<SessionController>,
    commands: UnboundedSender<Command>,
    icon: IconImage,
) -> ! {
    controller.options().set_auto_stop(false);
    controller.options().set_auto_start(false);

    let event_loop = EventLoopBuilder::<UiMessage>::with_user_event().build();
    let proxy = Mutex::new(event_loop.create_proxy());
    controller.register_observer(Arc::new(UiBridge::new(move |message| {
        if let Ok(proxy) = proxy.lock() {
            let _ = proxy.send_event(message);
        }
    })));
    {
        let commands = commands.clone();
        tray::set_action_handler(move |action| {
            if let Some(command) = action.command() {
                let _ = commands.send(command);
            }
        });
    }
    let _ = commands.send(Command::Start);
    info!("Running headless; use the tray icon or Ctrl+C to exit");

    let mut status = MonitorStatus::new();
    let mut tray: Option<Tray> = None;
    event_loop.run(move |event, _, control_flow| {
        // Keeps the scan and watcher tasks alive for as long as the loop runs.
        let _runtime = &runtime;
        *control_flow = ControlFlow::Wait;

        match event {
            Event::NewEvents(StartCause::Init) => match Tray::new(&icon, false) {
                Ok(created) => {
                    created.set_monitoring(controller.is_monitoring());
                    tray = Some(created);
                }
                Err(e) => error!("Tray icon unavailable: {e:#}"),
            },
            Event::UserEvent(UiMessage::Quit) => {
                tray.take();
                *control_flow = ControlFlow::Exit;
            }
            Event::UserEvent(message) => {
                if message.apply_to(&mut status) {
                    debug!("Status: {}", status.message);
                }
                if let Some(tray) = &tray {
                    tray.set_monitoring(status.is_monitoring());
                }
            }
            _ => {}
        }
    })
}

/// Applies window, tray, watcher and signal requests to the controller, in arrival order.
async fn run_commands(controller: Arc<SessionController>, mut rx: UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Start => {
                if let Err(e) = controller.start().await {
                    error!("Failed to start monitoring: {e:#}");
                }
            }

            Command::Stop => {
                controller.stop().await;
            }

            Command::SettingsChanged(settings) => {
                let store = controller.settings();
                if *store.load() == settings {
                    debug!("Settings file rewritten without changes");
                    continue;
                }
                store.replace(settings);
                info!("Settings reloaded from {}", store.path().display());
                controller.announce(RELOADED_TEXT);
            }

            Command::Exit => {
                controller.exit().await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio::time::{sleep, Duration};

    use crate::config::Settings;
    use crate::matcher::MatchResult;
    use crate::testing::{
        controller_with, settings_in, RecordingClicker, RecordingObserver, ScriptedMatcher,
    };

    fn spawn_loop() -> (
        Arc<SessionController>,
        Arc<RecordingObserver>,
        UnboundedSender<Command>,
        tokio::task::JoinHandle<()>,
    ) {
        let (controller, observer) = controller_with(
            Arc::new(ScriptedMatcher::always(MatchResult::NotFound)),
            Arc::new(RecordingClicker::default()),
            settings_in(Path::new("/base"), 1.0),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_commands(Arc::clone(&controller), rx));
        (controller, observer, tx, handle)
    }

    // ── Cli ───────────────────────────────────────────────────────────────────

    #[test]
    fn cli_defaults_to_window_mode() {
        let cli = Cli::try_parse_from(["lol-auto-accept"]).unwrap();
        assert!(!cli.nogui);
    }

    #[test]
    fn cli_accepts_nogui() {
        let cli = Cli::try_parse_from(["lol-auto-accept", "--nogui"]).unwrap();
        assert!(cli.nogui);
    }

    #[test]
    fn cli_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["lol-auto-accept", "--fast"]).is_err());
    }

    // ── run_commands ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_requests_drive_the_controller() {
        let (controller, observer, tx, _handle) = spawn_loop();

        tx.send(Command::Start).unwrap();
        tx.send(Command::Start).unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(controller.is_monitoring());
        assert_eq!(observer.started(), 1);

        tx.send(Command::Stop).unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(!controller.is_monitoring());
        assert_eq!(observer.stopped(), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_settings_are_swapped_in_and_announced() {
        let (controller, observer, tx, _handle) = spawn_loop();

        let mut edited = (*controller.settings().load()).clone();
        edited.template_matching.interval_sec = 3.0;
        tx.send(Command::SettingsChanged(edited)).unwrap();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(controller.settings().load().interval(), Duration::from_secs(3));
        assert_eq!(observer.notices(), vec![RELOADED_TEXT.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_settings_are_not_announced() {
        let (controller, observer, tx, _handle) = spawn_loop();

        let same: Settings = (*controller.settings().load()).clone();
        tx.send(Command::SettingsChanged(same)).unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(observer.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_stops_monitoring_and_ends_the_loop() {
        let (controller, observer, tx, handle) = spawn_loop();

        tx.send(Command::Start).unwrap();
        tx.send(Command::Exit).unwrap();
        // Requests after exit are never processed.
        let _ = tx.send(Command::Start);
        handle.await.unwrap();

        assert!(!controller.is_running());
        assert!(!controller.is_monitoring());
        assert_eq!(observer.started(), 1);
        assert_eq!(observer.exits(), 1);
    }
}

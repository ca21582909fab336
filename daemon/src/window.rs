/// Desktop window: start/stop controls, option toggles, settings actions, status line.
///
/// The window also owns the tray icon, since both must live on the UI thread.  Controller
/// transitions reach it as [`UiMessage`]s drained at the top of every frame.
use std::sync::{mpsc, Arc};

use eframe::egui;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::bridge::{UiBridge, UiMessage};
use crate::config::Settings;
use crate::controller::SessionController;
use crate::event::Command;
use crate::status::{MonitorStatus, StatusTone, RELOADED_TEXT, SAVED_TEXT};
use crate::tray::{self, IconImage, Tray, TrayAction};

pub const WINDOW_TITLE: &str = "LoL Auto Accept";

pub struct MonitorWindow {
    controller: Arc<SessionController>,
    commands: UnboundedSender<Command>,
    messages: mpsc::Receiver<UiMessage>,
    status: MonitorStatus,
    tray: Option<Tray>,
    quitting: bool,
}

impl MonitorWindow {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: Arc<SessionController>,
        commands: UnboundedSender<Command>,
        icon: &IconImage,
    ) -> Self {
        let (tx, messages) = mpsc::channel();
        let ctx = cc.egui_ctx.clone();
        let bridge = UiBridge::new(move |message| {
            let _ = tx.send(message);
            ctx.request_repaint();
        });
        controller.register_observer(Arc::new(bridge.clone()));

        let tray = match Tray::new(icon, true) {
            Ok(tray) => Some(tray),
            Err(e) => {
                warn!("Tray icon unavailable: {e:#}");
                None
            }
        };
        {
            let commands = commands.clone();
            tray::set_action_handler(move |action| match action.command() {
                Some(command) => {
                    let _ = commands.send(command);
                }
                None if action == TrayAction::Open => bridge.post(UiMessage::Show),
                None => {}
            });
        }

        // Auto-detect may have started a session before the observer was registered.
        let mut status = MonitorStatus::new();
        if controller.is_monitoring() {
            status.started();
        }
        if let Some(tray) = &tray {
            tray.set_monitoring(status.is_monitoring());
        }

        Self {
            controller,
            commands,
            messages,
            status,
            tray,
            quitting: false,
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            error!("Command loop is gone; request dropped");
        }
    }

    fn drain_messages(&mut self, ctx: &egui::Context) {
        while let Ok(message) = self.messages.try_recv() {
            match message {
                UiMessage::Show => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                    ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
                    ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                }
                UiMessage::Quit => {
                    self.quitting = true;
                    self.tray = None;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                other => {
                    other.apply_to(&mut self.status);
                    if let Some(tray) = &self.tray {
                        tray.set_monitoring(self.status.is_monitoring());
                    }
                }
            }
        }
    }

    fn reload_settings(&mut self) {
        self.controller.settings().reload();
        self.status.info(RELOADED_TEXT);
    }

    fn save_settings(&mut self) {
        match self.controller.settings().save() {
            Ok(()) => self.status.info(SAVED_TEXT),
            Err(e) => {
                error!("Failed to save settings: {e:#}");
                self.status.info("Saving settings failed");
            }
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let monitoring = self.status.is_monitoring();
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!monitoring, egui::Button::new("Start"))
                .clicked()
            {
                self.send(Command::Start);
            }
            if ui
                .add_enabled(monitoring, egui::Button::new("Stop"))
                .clicked()
            {
                self.send(Command::Stop);
            }
        });

        ui.add_space(6.0);
        let options = self.controller.options();
        let mut auto_stop = options.auto_stop();
        if ui
            .checkbox(&mut auto_stop, "Auto-stop after accept")
            .changed()
        {
            options.set_auto_stop(auto_stop);
        }
        let mut auto_start = options.auto_start();
        if ui
            .checkbox(&mut auto_start, "Auto-start on matchmaking")
            .changed()
        {
            options.set_auto_start(auto_start);
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            if ui.button("Reload settings").clicked() {
                self.reload_settings();
            }
            if ui.button("Save settings").clicked() {
                self.save_settings();
            }
        });
    }

    fn status_line(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(&self.status.message)
                    .color(tone_color(self.status.tone))
                    .strong(),
            );
            ui.label(
                egui::RichText::new(format!("since {}", self.status.changed_at_label())).weak(),
            );
        });
        ui.label(
            egui::RichText::new(settings_summary(&self.controller.settings().load()))
                .small()
                .weak(),
        );
    }
}

impl eframe::App for MonitorWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_messages(ctx);

        // Closing only hides to the taskbar; Exit is the way out.
        if ctx.input(|i| i.viewport().close_requested()) && !self.quitting {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(WINDOW_TITLE);
            ui.separator();
            self.controls(ui);
            ui.separator();
            self.status_line(ui);

            ui.with_layout(egui::Layout::bottom_up(egui::Align::RIGHT), |ui| {
                if ui.button("Exit").clicked() {
                    self.send(Command::Exit);
                }
            });
        });
    }
}

fn tone_color(tone: StatusTone) -> egui::Color32 {
    match tone {
        StatusTone::Normal => egui::Color32::from_rgb(150, 150, 150),
        StatusTone::Active => egui::Color32::from_rgb(80, 200, 120),
        StatusTone::Info => egui::Color32::from_rgb(90, 160, 230),
    }
}

fn settings_summary(settings: &Settings) -> String {
    format!(
        "Confidence {:.2}  |  Interval {:.1}s",
        settings.confidence(),
        settings.interval().as_secs_f64()
    )
}

/// Window icon built from the same pixels as the tray icon.
pub fn icon_data(icon: &IconImage) -> egui::IconData {
    egui::IconData {
        rgba: icon.rgba.clone(),
        width: icon.width,
        height: icon.height,
    }
}

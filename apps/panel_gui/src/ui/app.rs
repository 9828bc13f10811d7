use std::time::Duration;

use client_core::{ButtonView, PanelEvent, RenderState};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::domain::{Command, Setpoints};

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::{
        events::{UiError, UiErrorContext, UiEvent},
        orchestration::dispatch_backend_command,
    },
};

/// Highlight for a button whose command is starting or running.
pub const ACTIVE_FILL: egui::Color32 = egui::Color32::from_rgb(0xba, 0xe6, 0xfd);
/// Brief flash on the button that blocked a click.
pub const BLOCKED_FILL: egui::Color32 = egui::Color32::from_rgb(0xfe, 0xca, 0xca);

const BUTTON_SIZE: [f32; 2] = [240.0, 44.0];

pub struct ControlPanelApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    status: String,
    error: Option<UiError>,
    pressure: Option<f64>,
    setpoints: Option<Setpoints>,
    onroad_draft: String,
    offroad_draft: String,
    save_in_flight: bool,
    buttons: [ButtonView; 2],
    blocked: [bool; 2],
}

impl ControlPanelApp {
    pub fn new(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            status: "Starting...".to_string(),
            error: None,
            pressure: None,
            setpoints: None,
            onroad_draft: String::new(),
            offroad_draft: String::new(),
            save_in_flight: false,
            buttons: [ButtonView::idle(), ButtonView::idle()],
            blocked: [false, false],
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Info(message) => self.status = message,
            UiEvent::Error(err) => {
                tracing::warn!(context = ?err.context(), "{}", err.message());
                self.error = Some(err);
            }
            UiEvent::Panel(event) => self.apply_panel_event(event),
        }
    }

    fn apply_panel_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Button {
                command,
                state,
                elapsed_secs,
            } => {
                let idx = command.index();
                if state == RenderState::Blocked {
                    self.blocked[idx] = true;
                } else {
                    self.blocked[idx] = false;
                    self.buttons[idx] = ButtonView::new(state, elapsed_secs);
                }
            }
            PanelEvent::Pressure(psi) => self.pressure = Some(psi),
            PanelEvent::Setpoints(setpoints) => {
                self.setpoints = Some(setpoints);
                self.onroad_draft = format_setpoint(setpoints.setpoint_onroad);
                self.offroad_draft = format_setpoint(setpoints.setpoint_offroad);
            }
            PanelEvent::SetpointsSaved(setpoints) => {
                self.setpoints = Some(setpoints);
                self.save_in_flight = false;
                self.error = None;
                self.status = "Setpoints saved".to_string();
            }
            PanelEvent::RequestFailed { operation, message } => {
                if operation == "save_setpoints" {
                    self.save_in_flight = false;
                }
                self.error = Some(UiError::from_message(
                    UiErrorContext::for_operation(operation),
                    message,
                ));
            }
        }
    }

    fn press(&mut self, command: Command) {
        dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::Press(command),
            &mut self.status,
        );
    }

    fn save_setpoints(&mut self) {
        match parse_setpoint_drafts(&self.onroad_draft, &self.offroad_draft) {
            Ok(setpoints) => {
                self.error = None;
                self.save_in_flight = dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::SaveSetpoints(setpoints),
                    &mut self.status,
                );
            }
            Err(message) => {
                self.error = Some(UiError::from_message(
                    UiErrorContext::SaveSetpoints,
                    message,
                ));
            }
        }
    }

    fn show_pressure(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Pressure");
            ui.heading(pressure_text(self.pressure));
        });
    }

    fn show_setpoints(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("setpoints")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("On-road (psi)");
                ui.text_edit_singleline(&mut self.onroad_draft);
                ui.end_row();
                ui.label("Off-road (psi)");
                ui.text_edit_singleline(&mut self.offroad_draft);
                ui.end_row();
            });

        ui.horizontal(|ui| {
            let label = if self.save_in_flight { "Saving..." } else { "Save" };
            if ui
                .add_enabled(!self.save_in_flight, egui::Button::new(label))
                .clicked()
            {
                self.save_setpoints();
            }
            if ui.button("Reload").clicked() {
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::ReloadSetpoints,
                    &mut self.status,
                );
            }
        });
    }

    fn show_buttons(&mut self, ui: &mut egui::Ui) {
        for command in Command::ALL {
            let idx = command.index();
            let view = self.buttons[idx];
            let mut button = egui::Button::new(view.label(command, self.setpoints.as_ref()))
                .min_size(egui::vec2(BUTTON_SIZE[0], BUTTON_SIZE[1]));
            if let Some(fill) = button_fill(&view, self.blocked[idx]) {
                button = button.fill(fill);
            }
            if ui.add_enabled(view.is_interactive(), button).clicked() {
                self.press(command);
            }
            ui.add_space(6.0);
        }
    }
}

impl eframe::App for ControlPanelApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            if let Some(err) = &self.error {
                ui.colored_label(egui::Color32::from_rgb(175, 96, 96), err.banner());
            }
            ui.label(&self.status);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_pressure(ui);
            ui.separator();
            self.show_setpoints(ui);
            ui.separator();
            self.show_buttons(ui);
        });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

pub fn button_fill(view: &ButtonView, blocked: bool) -> Option<egui::Color32> {
    if blocked {
        return Some(BLOCKED_FILL);
    }
    match view.state {
        RenderState::Starting | RenderState::Running => Some(ACTIVE_FILL),
        RenderState::Idle | RenderState::Cancelling | RenderState::Blocked => None,
    }
}

pub fn pressure_text(pressure: Option<f64>) -> String {
    match pressure {
        Some(psi) => format!("{psi:.2} psi"),
        None => "-- psi".to_string(),
    }
}

pub fn format_setpoint(value: f64) -> String {
    format!("{value}")
}

pub fn parse_setpoint_drafts(onroad: &str, offroad: &str) -> Result<Setpoints, String> {
    let parse = |name: &str, raw: &str| {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("{name} is not a number: {raw:?}"))
    };
    Ok(Setpoints {
        setpoint_onroad: parse("on-road setpoint", onroad)?,
        setpoint_offroad: parse("off-road setpoint", offroad)?,
    })
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;

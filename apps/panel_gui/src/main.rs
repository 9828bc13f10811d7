mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;

use crate::{backend_bridge::commands::BackendCommand, controller::events::UiEvent, ui::ControlPanelApp};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "AIRCTL_FIRMWARE_URL", default_value = "http://192.168.4.1")]
    firmware_url: String,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(512);
    backend_bridge::runtime::launch(args.firmware_url, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Air Suspension")
            .with_inner_size([420.0, 360.0])
            .with_min_inner_size([360.0, 300.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Air Suspension",
        options,
        Box::new(|_cc| Ok(Box::new(ControlPanelApp::new(cmd_tx, ui_rx)))),
    )
}

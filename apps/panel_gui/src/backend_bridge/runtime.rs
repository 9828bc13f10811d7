//! Worker thread owning the tokio runtime and the control panel.

use std::{sync::Arc, thread};

use client_core::{ControlPanel, HttpFirmwareClient, PanelConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::events::{UiError, UiErrorContext, UiEvent},
};

pub fn launch(firmware_url: String, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let client = match HttpFirmwareClient::new(&firmware_url) {
                Ok(client) => client,
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        err.to_string(),
                    )));
                    tracing::error!(%firmware_url, "invalid firmware url: {err}");
                    return;
                }
            };

            let panel = ControlPanel::new(Arc::new(client), PanelConfig::default());
            let mut events = panel.subscribe();
            let forward_tx = ui_tx.clone();
            let forwarder = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => match forward_tx.try_send(UiEvent::Panel(event)) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::warn!("ui event queue full; panel event dropped")
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "panel events lagged")
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let _tasks = panel.start().await;
            let _ = ui_tx.try_send(UiEvent::Info(format!("Polling {firmware_url}")));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Press(command) => {
                        panel.click(command).await;
                    }
                    BackendCommand::SaveSetpoints(setpoints) => {
                        panel.save_setpoints(setpoints).await;
                    }
                    BackendCommand::ReloadSetpoints => panel.load_setpoints().await,
                }
            }

            tracing::info!("ui command queue closed; backend worker stopping");
            forwarder.abort();
        });
    });
}

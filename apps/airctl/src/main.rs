use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    ButtonView, ControlPanel, FirmwareApi, HttpFirmwareClient, PanelConfig, PanelEvent,
};
use shared::domain::{Command, CommandAction, Setpoints};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(about = "Command-line control for the air suspension firmware")]
struct Cli {
    #[arg(long, env = "AIRCTL_FIRMWARE_URL", default_value = "http://192.168.4.1")]
    firmware_url: String,
    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Print the current sensor pressure.
    Pressure,
    /// Print the stored setpoints.
    Setpoints,
    SetSetpoints {
        #[arg(long)]
        onroad: f64,
        #[arg(long)]
        offroad: f64,
    },
    AirUp {
        #[arg(value_enum, default_value_t = Action::Start)]
        action: Action,
    },
    AirDown {
        #[arg(value_enum, default_value_t = Action::Start)]
        action: Action,
    },
    /// Run the interactive panel: polls status and reads `up`/`down` from stdin.
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Cancel,
    Status,
}

impl From<Action> for CommandAction {
    fn from(value: Action) -> Self {
        match value {
            Action::Start => CommandAction::Start,
            Action::Cancel => CommandAction::Cancel,
            Action::Status => CommandAction::Status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let client =
        HttpFirmwareClient::with_timeout(&cli.firmware_url, Duration::from_millis(cli.timeout_ms))
            .context("invalid firmware url")?;

    match cli.command {
        CliCommand::Pressure => {
            let psi = client.pressure().await?;
            println!("{psi:.2} psi");
        }
        CliCommand::Setpoints => {
            let setpoints = client.setpoints().await?;
            println!("{}", serde_json::to_string_pretty(&setpoints)?);
        }
        CliCommand::SetSetpoints { onroad, offroad } => {
            client
                .save_setpoints(Setpoints {
                    setpoint_onroad: onroad,
                    setpoint_offroad: offroad,
                })
                .await?;
            println!("saved onroad={onroad} offroad={offroad}");
        }
        CliCommand::AirUp { action } => send(&client, Command::AirUp, action.into()).await?,
        CliCommand::AirDown { action } => send(&client, Command::AirDown, action.into()).await?,
        CliCommand::Watch => watch(client).await?,
    }

    Ok(())
}

async fn send(client: &HttpFirmwareClient, command: Command, action: CommandAction) -> Result<()> {
    let reply = client.command(command, action).await?;
    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Press(Command),
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "up" | "u" => Some(Input::Press(Command::AirUp)),
        "down" | "d" => Some(Input::Press(Command::AirDown)),
        "quit" | "q" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

/// Formats a panel event as a single console line, tracking setpoints for labels.
fn describe(event: &PanelEvent, setpoints: &mut Option<Setpoints>) -> String {
    match event {
        PanelEvent::Button {
            command,
            state,
            elapsed_secs,
        } => {
            let label = ButtonView::new(*state, *elapsed_secs).label(*command, setpoints.as_ref());
            format!("[{}] {label} ({state:?})", command.display_name())
        }
        PanelEvent::Pressure(psi) => format!("pressure {psi:.2} psi"),
        PanelEvent::Setpoints(loaded) => {
            *setpoints = Some(*loaded);
            format!(
                "setpoints onroad={} offroad={}",
                loaded.setpoint_onroad, loaded.setpoint_offroad
            )
        }
        PanelEvent::SetpointsSaved(saved) => {
            *setpoints = Some(*saved);
            "setpoints saved".to_string()
        }
        PanelEvent::RequestFailed { operation, message } => {
            format!("{operation} failed: {message}")
        }
    }
}

async fn watch(client: HttpFirmwareClient) -> Result<()> {
    let panel = ControlPanel::new(Arc::new(client), PanelConfig::default());
    let mut events = panel.subscribe();
    let _tasks = panel.start().await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut setpoints = None;

    println!("type `up` or `down` to press a button, `quit` to exit");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event, &mut setpoints)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "panel events dropped"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => match parse_input(&line) {
                    Some(Input::Press(command)) => {
                        panel.click(command).await;
                    }
                    Some(Input::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown input {line:?}; expected up, down or quit"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

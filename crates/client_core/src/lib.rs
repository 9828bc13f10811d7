use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Command, CommandAction, Setpoints},
    protocol::{Ack, CommandReply, PressureReading, ReplyStatus},
};
use tracing::debug;
use url::Url;

pub mod error;
pub mod panel;
pub mod reconciler;

pub use error::{ClientError, Result};
pub use panel::{ControlPanel, PanelConfig, PanelEvent, PanelTasks};
pub use reconciler::{
    ButtonView, ClickOutcome, CommandState, ExpectedState, Reconciler, RenderSink, RenderState,
    SampleOutcome, SampleStatus, StatusSample,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// The firmware's HTTP surface, as the panel consumes it.
#[async_trait]
pub trait FirmwareApi: Send + Sync {
    async fn pressure(&self) -> Result<f64>;
    async fn setpoints(&self) -> Result<Setpoints>;
    async fn save_setpoints(&self, setpoints: Setpoints) -> Result<()>;
    async fn command(&self, command: Command, action: CommandAction) -> Result<CommandReply>;

    async fn status(&self, command: Command) -> Result<StatusSample> {
        let reply = self.command(command, CommandAction::Status).await?;
        status_sample(command, &reply)
    }
}

/// Turns a status reply into a sample. Only `running` and `idle` are samples;
/// anything else never reaches the reconciler.
pub fn status_sample(command: Command, reply: &CommandReply) -> Result<StatusSample> {
    match reply.status {
        ReplyStatus::Running => Ok(StatusSample::running(reply.time.unwrap_or(0.0))),
        ReplyStatus::Idle => Ok(StatusSample::idle()),
        ref other => Err(ClientError::UnexpectedStatus {
            command,
            status: other.as_str().to_string(),
        }),
    }
}

pub struct HttpFirmwareClient {
    http: Client,
    base_url: String,
}

impl HttpFirmwareClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::HttpClient)?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send_json<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|source| ClientError::Transport {
            path: path.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().await.map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|err| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl FirmwareApi for HttpFirmwareClient {
    async fn pressure(&self) -> Result<f64> {
        let reading: PressureReading = self
            .send_json("/pressure", self.http.get(self.url("/pressure")))
            .await?;
        Ok(reading.pressure)
    }

    async fn setpoints(&self) -> Result<Setpoints> {
        self.send_json("/get_setpoints", self.http.get(self.url("/get_setpoints")))
            .await
    }

    async fn save_setpoints(&self, setpoints: Setpoints) -> Result<()> {
        let ack: Ack = self
            .send_json(
                "/set_setpoints",
                self.http.post(self.url("/set_setpoints")).json(&setpoints),
            )
            .await?;
        debug!(status = %ack.status, "setpoints saved");
        Ok(())
    }

    async fn command(&self, command: Command, action: CommandAction) -> Result<CommandReply> {
        let url = self.url(command.route());
        let request = match action {
            CommandAction::Status => self.http.get(url),
            CommandAction::Start | CommandAction::Cancel => self.http.post(url),
        };
        self.send_json(
            command.route(),
            request.query(&[("action", action.as_str())]),
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use serde::{Deserialize, Serialize};

use crate::domain::Command;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureReading {
    pub pressure: f64,
}

/// Status strings the firmware puts in a command reply.
///
/// Unrecognised strings are kept verbatim in [`ReplyStatus::Unknown`] so a
/// firmware revision with new states never fails deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReplyStatus {
    Started,
    AlreadyRunning,
    Running,
    Idle,
    Cancelled,
    NotRunning,
    Error,
    Unknown(String),
}

impl ReplyStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::AlreadyRunning => "already_running",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Cancelled => "cancelled",
            Self::NotRunning => "not_running",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for ReplyStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "started" => Self::Started,
            "already_running" => Self::AlreadyRunning,
            "running" => Self::Running,
            "idle" => Self::Idle,
            "cancelled" => Self::Cancelled,
            "not_running" => Self::NotRunning,
            "error" => Self::Error,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ReplyStatus> for String {
    fn from(value: ReplyStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// Seconds since the command started, reported by `status` queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandReply {
    pub fn new(status: ReplyStatus, command: Command) -> Self {
        Self {
            status,
            command: Some(command),
            time: None,
            message: None,
        }
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

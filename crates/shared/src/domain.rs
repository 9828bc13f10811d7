use serde::{Deserialize, Serialize};

/// One of the two long-running pneumatic actions the firmware exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    AirUp,
    AirDown,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::AirUp, Command::AirDown];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::AirUp => "air_up",
            Self::AirDown => "air_down",
        }
    }

    pub fn route(self) -> &'static str {
        match self {
            Self::AirUp => "/air_up",
            Self::AirDown => "/air_down",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::AirUp => "Air Up",
            Self::AirDown => "Air Down",
        }
    }

    /// The command that excludes this one while it is running.
    pub fn other(self) -> Self {
        match self {
            Self::AirUp => Self::AirDown,
            Self::AirDown => Self::AirUp,
        }
    }

    /// Air up inflates toward the on-road pressure, air down vents toward off-road.
    pub fn target_psi(self, setpoints: &Setpoints) -> f64 {
        match self {
            Self::AirUp => setpoints.setpoint_onroad,
            Self::AirDown => setpoints.setpoint_offroad,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::AirUp => 0,
            Self::AirDown => 1,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    #[default]
    Start,
    Cancel,
    Status,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Status => "status",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(Self::Start),
            "cancel" => Some(Self::Cancel),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

pub const DEFAULT_SETPOINT_ONROAD: f64 = 32.0;
pub const DEFAULT_SETPOINT_OFFROAD: f64 = 14.0;

/// Target pressures in psi.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    pub setpoint_onroad: f64,
    pub setpoint_offroad: f64,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            setpoint_onroad: DEFAULT_SETPOINT_ONROAD,
            setpoint_offroad: DEFAULT_SETPOINT_OFFROAD,
        }
    }
}

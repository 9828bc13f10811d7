//! Backend commands queued from UI to backend worker.

use shared::domain::{Command, Setpoints};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Press(Command),
    SaveSetpoints(Setpoints),
    ReloadSetpoints,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Press(_) => "press",
            Self::SaveSetpoints(_) => "save_setpoints",
            Self::ReloadSetpoints => "reload_setpoints",
        }
    }
}

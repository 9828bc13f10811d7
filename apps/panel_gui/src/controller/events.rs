//! UI/backend events and error modeling for the panel controller.

use client_core::PanelEvent;

#[derive(Debug)]
pub enum UiEvent {
    Info(String),
    Panel(PanelEvent),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    LoadSetpoints,
    SaveSetpoints,
    General,
}

impl UiErrorContext {
    pub fn for_operation(operation: &str) -> Self {
        match operation {
            "load_setpoints" => Self::LoadSetpoints,
            "save_setpoints" => Self::SaveSetpoints,
            _ => Self::General,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("invalid")
            || message_lower.contains("not a number")
            || message_lower.contains("malformed")
            || message_lower.contains("400")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("request to")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// One-line text for the status banner.
    pub fn banner(&self) -> String {
        let prefix = match self.context {
            UiErrorContext::BackendStartup => "Backend failed to start",
            UiErrorContext::LoadSetpoints => "Could not load setpoints",
            UiErrorContext::SaveSetpoints => "Could not save setpoints",
            UiErrorContext::General => "Error",
        };
        let hint = match self.category {
            UiErrorCategory::Transport => " (is the controller reachable?)",
            UiErrorCategory::Validation | UiErrorCategory::Unknown => "",
        };
        format!("{prefix}: {}{hint}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unreachable_firmware_as_transport_error() {
        let err = UiError::from_message(
            UiErrorContext::LoadSetpoints,
            "request to /get_setpoints failed: error sending request: connection refused",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(err.banner().starts_with("Could not load setpoints"));
        assert!(err.banner().ends_with("(is the controller reachable?)"));
    }

    #[test]
    fn classifies_bad_setpoint_text_as_validation_error() {
        let err = UiError::from_message(UiErrorContext::SaveSetpoints, "onroad is not a number");
        assert_eq!(err.category(), UiErrorCategory::Validation);
        assert_eq!(err.context(), UiErrorContext::SaveSetpoints);
    }

    #[test]
    fn operations_map_to_contexts() {
        assert_eq!(
            UiErrorContext::for_operation("save_setpoints"),
            UiErrorContext::SaveSetpoints
        );
        assert_eq!(
            UiErrorContext::for_operation("load_setpoints"),
            UiErrorContext::LoadSetpoints
        );
        assert_eq!(UiErrorContext::for_operation("other"), UiErrorContext::General);
    }
}

//! UI layer: the single-window control panel.

pub mod app;

pub use app::ControlPanelApp;

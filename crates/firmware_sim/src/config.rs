use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "firmware_sim.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub setpoints_path: PathBuf,
    pub initial_psi: f64,
    pub fill_rate_psi_per_sec: f64,
    pub vent_rate_psi_per_sec: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            setpoints_path: PathBuf::from("setpoints.json"),
            initial_psi: 20.0,
            fill_rate_psi_per_sec: 1.5,
            vent_rate_psi_per_sec: 0.8,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    setpoints_path: Option<PathBuf>,
    initial_psi: Option<f64>,
    fill_rate: Option<f64>,
    vent_rate: Option<f64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |name| std::env::var(name).ok())
}

/// File values override defaults; environment values override the file.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable config file"),
        }
    }

    if let Some(v) = env("SIM_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("SIM_SETPOINTS_PATH") {
        settings.setpoints_path = PathBuf::from(v);
    }
    if let Some(v) = parse_env(&env, "SIM_INITIAL_PSI") {
        settings.initial_psi = v;
    }
    if let Some(v) = parse_env(&env, "SIM_FILL_RATE") {
        settings.fill_rate_psi_per_sec = v;
    }
    if let Some(v) = parse_env(&env, "SIM_VENT_RATE") {
        settings.vent_rate_psi_per_sec = v;
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.bind_addr = v;
    }
    if let Some(v) = file_cfg.setpoints_path {
        settings.setpoints_path = v;
    }
    if let Some(v) = file_cfg.initial_psi {
        settings.initial_psi = v;
    }
    if let Some(v) = file_cfg.fill_rate {
        settings.fill_rate_psi_per_sec = v;
    }
    if let Some(v) = file_cfg.vent_rate {
        settings.vent_rate_psi_per_sec = v;
    }
}

fn parse_env(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<f64> {
    let raw = env(name)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(name, value = %raw, "ignoring non-numeric environment override");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

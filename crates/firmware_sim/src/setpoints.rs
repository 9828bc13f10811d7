use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Setpoints, DEFAULT_SETPOINT_OFFROAD, DEFAULT_SETPOINT_ONROAD},
    error::ApiException,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Setpoints persisted as a small JSON document next to the simulator.
pub struct SetpointStore {
    path: PathBuf,
    current: Mutex<Setpoints>,
}

#[derive(Debug, Deserialize)]
struct StoredSetpoints {
    #[serde(default = "default_onroad")]
    setpoint_onroad: f64,
    #[serde(default = "default_offroad")]
    setpoint_offroad: f64,
}

fn default_onroad() -> f64 {
    DEFAULT_SETPOINT_ONROAD
}

fn default_offroad() -> f64 {
    DEFAULT_SETPOINT_OFFROAD
}

impl SetpointStore {
    /// Loads the stored setpoints; a missing or corrupt file yields the defaults.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<StoredSetpoints>(&raw) {
                Ok(stored) => Setpoints {
                    setpoint_onroad: stored.setpoint_onroad,
                    setpoint_offroad: stored.setpoint_offroad,
                },
                Err(err) => {
                    warn!(path = %path.display(), %err, "setpoints file unreadable, using defaults");
                    Setpoints::default()
                }
            },
            Err(_) => Setpoints::default(),
        };
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Setpoints {
        *self.current.lock().await
    }

    pub async fn set(&self, setpoints: Setpoints) -> Result<(), ApiException> {
        let mut current = self.current.lock().await;
        let body = serde_json::to_vec(&setpoints)
            .map_err(|err| ApiException::internal(format!("encode setpoints: {err}")))?;
        tokio::fs::write(&self.path, body).await.map_err(|err| {
            ApiException::internal(format!("write {}: {err}", self.path.display()))
        })?;
        *current = setpoints;
        info!(
            onroad = setpoints.setpoint_onroad,
            offroad = setpoints.setpoint_offroad,
            "setpoints saved"
        );
        Ok(())
    }
}

/// A setpoint as submitted by a client: either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetpointValue {
    Number(f64),
    Text(String),
}

impl Default for SetpointValue {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl SetpointValue {
    fn to_psi(&self, field: &str) -> Result<f64, ApiException> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(raw) => raw.trim().parse::<f64>().map_err(|_| {
                ApiException::validation(format!("{field} is not a number: {raw:?}"))
            })?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ApiException::validation(format!("{field} must be finite")))
        }
    }
}

/// Body of `/set_setpoints`. Missing fields are treated as zero.
#[derive(Debug, Default, Deserialize)]
pub struct SetpointsUpdate {
    #[serde(default)]
    pub setpoint_onroad: SetpointValue,
    #[serde(default)]
    pub setpoint_offroad: SetpointValue,
}

impl SetpointsUpdate {
    pub fn into_setpoints(self) -> Result<Setpoints, ApiException> {
        Ok(Setpoints {
            setpoint_onroad: self.setpoint_onroad.to_psi("setpoint_onroad")?,
            setpoint_offroad: self.setpoint_offroad.to_psi("setpoint_offroad")?,
        })
    }
}

#[cfg(test)]
#[path = "tests/setpoints_tests.rs"]
mod tests;

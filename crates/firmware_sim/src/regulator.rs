//! Closed-loop pressure adjustment.
//!
//! Each pass waits for the spring to settle, then either stops (target reached
//! or overshot) or opens the command's valve for a time derived from the
//! learned fill/vent rate.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use shared::domain::Command;
use tracing::{debug, info};

use crate::{firmware::Firmware, pneumatics::Valve};

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatorTuning {
    pub tolerance_psi: f64,
    /// Below this remaining error the valve is pulsed for `min_valve`.
    pub near_target_psi: f64,
    /// Fraction of the predicted time to open the valve for.
    pub approach_fraction: f64,
    pub learning_rate: f64,
    pub min_rate: f64,
    /// Minimum gap since the previous valve action before a rate is learned.
    pub rate_window: Duration,
    pub default_valve: Duration,
    pub min_valve: Duration,
    pub max_valve_up: Duration,
    pub max_valve_down: Duration,
    pub valve_slice: Duration,
    pub settle_initial_delay: Duration,
    pub settle_check_interval: Duration,
    pub settle_max_wait: Duration,
    /// psi per second.
    pub stability_threshold: f64,
}

impl Default for RegulatorTuning {
    fn default() -> Self {
        Self {
            tolerance_psi: 0.5,
            near_target_psi: 1.0,
            approach_fraction: 0.8,
            learning_rate: 0.3,
            min_rate: 0.01,
            rate_window: Duration::from_secs(1),
            default_valve: Duration::from_secs(3),
            min_valve: Duration::from_secs(1),
            max_valve_up: Duration::from_secs(30),
            max_valve_down: Duration::from_secs(60),
            valve_slice: Duration::from_millis(100),
            settle_initial_delay: Duration::from_millis(200),
            settle_check_interval: Duration::from_millis(250),
            settle_max_wait: Duration::from_secs(3),
            stability_threshold: 0.5,
        }
    }
}

/// Rate model carried across runs of the same command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Learning {
    /// psi per second, always positive.
    pub observed_rate: Option<f64>,
    pub last_psi: Option<f64>,
    pub last_action_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    TargetReached,
    Overshot,
    Open { valve: Valve, duration: Duration },
}

/// Decides the next regulator step and updates the rate model.
pub fn plan(
    command: Command,
    target: f64,
    current: f64,
    now: Instant,
    learning: &mut Learning,
    tuning: &RegulatorTuning,
) -> Step {
    let diff = target - current;
    if diff.abs() <= tuning.tolerance_psi {
        return Step::TargetReached;
    }
    let overshot = match command {
        Command::AirUp => current > target,
        Command::AirDown => current < target,
    };
    if overshot {
        return Step::Overshot;
    }

    if let (Some(last_psi), Some(last_at)) = (learning.last_psi, learning.last_action_at) {
        let since = now.saturating_duration_since(last_at);
        if since > tuning.rate_window {
            let change = current - last_psi;
            let moved_right_way = match command {
                Command::AirUp => change > 0.0,
                Command::AirDown => change < 0.0,
            };
            let rate = change.abs() / since.as_secs_f64();
            if moved_right_way && rate > tuning.min_rate {
                learning.observed_rate = Some(match learning.observed_rate {
                    None => rate,
                    Some(prev) => (1.0 - tuning.learning_rate) * prev + tuning.learning_rate * rate,
                });
                debug!(%command, rate, "rate observed");
            }
        }
    }

    let duration = valve_time(command, diff, learning.observed_rate, tuning);
    learning.last_psi = Some(current);
    learning.last_action_at = Some(now);

    Step::Open {
        valve: Valve::for_command(command),
        duration,
    }
}

pub fn valve_time(
    command: Command,
    diff: f64,
    observed_rate: Option<f64>,
    tuning: &RegulatorTuning,
) -> Duration {
    let Some(rate) = observed_rate.filter(|rate| *rate > tuning.min_rate) else {
        return tuning.default_valve;
    };
    if diff.abs() < tuning.near_target_psi {
        return tuning.min_valve;
    }
    let max = match command {
        Command::AirUp => tuning.max_valve_up,
        Command::AirDown => tuning.max_valve_down,
    };
    let secs = diff.abs() * tuning.approach_fraction / rate;
    Duration::from_secs_f64(secs.clamp(tuning.min_valve.as_secs_f64(), max.as_secs_f64()))
}

/// Drives `command` toward `target` until done, cancelled, or superseded.
pub async fn run(firmware: Arc<Firmware>, command: Command, target: f64, run_id: u64) {
    loop {
        if !firmware.is_current(command, run_id).await {
            debug!(%command, run_id, "regulator stopping");
            return;
        }

        let current = firmware.wait_for_stable_pressure().await;
        let tuning = firmware.tuning().clone();
        let step = firmware
            .with_slot(command, |slot| {
                slot.is_current(run_id)
                    .then(|| plan(command, target, current, Instant::now(), &mut slot.learning, &tuning))
            })
            .await;

        match step {
            None => return,
            Some(Step::TargetReached) => {
                info!(%command, target, pressure = current, "target pressure reached");
                firmware.finish(command, run_id).await;
                return;
            }
            Some(Step::Overshot) => {
                info!(%command, target, pressure = current, "target overshot, stopping");
                firmware.finish(command, run_id).await;
                return;
            }
            Some(Step::Open { valve, duration }) => {
                debug!(%command, ?valve, ?duration, pressure = current, "opening valve");
                if !hold_open(&firmware, command, run_id, valve, duration).await {
                    return;
                }
            }
        }
    }
}

/// Holds `valve` open for `duration`, checking for cancellation every slice.
/// Returns false when the run was cancelled or superseded.
async fn hold_open(
    firmware: &Firmware,
    command: Command,
    run_id: u64,
    valve: Valve,
    duration: Duration,
) -> bool {
    let slice = firmware.tuning().valve_slice;
    let opened = Instant::now();
    firmware.set_valve(valve, true).await;

    let mut still_current = true;
    while opened.elapsed() < duration {
        if !firmware.is_current(command, run_id).await {
            still_current = false;
            break;
        }
        let remaining = duration.saturating_sub(opened.elapsed());
        tokio::time::sleep(slice.min(remaining)).await;
    }

    firmware.set_valve(valve, false).await;
    still_current
}

#[cfg(test)]
#[path = "tests/regulator_tests.rs"]
mod tests;

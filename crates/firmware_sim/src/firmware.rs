use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use shared::{
    domain::{Command, CommandAction},
    protocol::{CommandReply, ReplyStatus},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    pneumatics::{Pneumatics, Valve},
    regulator::{self, Learning, RegulatorTuning},
    setpoints::SetpointStore,
};

/// Run bookkeeping for one command.
#[derive(Debug, Default)]
pub struct CommandSlot {
    pub running: bool,
    pub cancel: bool,
    pub started_at: Option<Instant>,
    /// Incremented on each start so a superseded regulator task can tell it is stale.
    pub run_id: u64,
    pub learning: Learning,
}

impl CommandSlot {
    pub fn is_current(&self, run_id: u64) -> bool {
        self.running && !self.cancel && self.run_id == run_id
    }

    fn elapsed_secs(&self, now: Instant) -> f64 {
        self.started_at
            .map(|at| now.saturating_duration_since(at).as_secs_f64())
            .unwrap_or(0.0)
    }
}

pub struct Firmware {
    pneumatics: Mutex<Pneumatics>,
    slots: Mutex<[CommandSlot; 2]>,
    setpoints: SetpointStore,
    tuning: RegulatorTuning,
}

impl Firmware {
    pub fn new(
        pneumatics: Pneumatics,
        setpoints: SetpointStore,
        tuning: RegulatorTuning,
    ) -> Arc<Self> {
        Arc::new(Self {
            pneumatics: Mutex::new(pneumatics),
            slots: Mutex::new([CommandSlot::default(), CommandSlot::default()]),
            setpoints,
            tuning,
        })
    }

    pub fn setpoints(&self) -> &SetpointStore {
        &self.setpoints
    }

    pub fn tuning(&self) -> &RegulatorTuning {
        &self.tuning
    }

    pub async fn pressure(&self) -> f64 {
        self.pneumatics.lock().await.pressure_at(Instant::now())
    }

    pub async fn set_valve(&self, valve: Valve, open: bool) {
        self.pneumatics
            .lock()
            .await
            .set_valve(valve, open, Instant::now());
    }

    #[cfg(test)]
    pub async fn is_running(&self, command: Command) -> bool {
        self.slots.lock().await[command.index()].running
    }

    pub async fn is_current(&self, command: Command, run_id: u64) -> bool {
        self.slots.lock().await[command.index()].is_current(run_id)
    }

    /// Runs `f` against the slot of `command` while holding the slot lock.
    pub async fn with_slot<R>(&self, command: Command, f: impl FnOnce(&mut CommandSlot) -> R) -> R {
        let mut slots = self.slots.lock().await;
        f(&mut slots[command.index()])
    }

    /// Marks the run finished unless a newer run has replaced it.
    pub async fn finish(&self, command: Command, run_id: u64) {
        let mut slots = self.slots.lock().await;
        let slot = &mut slots[command.index()];
        if slot.run_id == run_id {
            slot.running = false;
            slot.started_at = None;
        }
    }

    /// Dispatches an `action` query value for `command`; absent means start.
    pub async fn handle(self: &Arc<Self>, command: Command, action: Option<&str>) -> CommandReply {
        let action = match action {
            None => CommandAction::Start,
            Some(raw) => match CommandAction::parse(raw) {
                Some(action) => action,
                None => {
                    warn!(%command, action = raw, "unknown action");
                    return CommandReply::new(ReplyStatus::Error, command)
                        .with_message(format!("Unknown action: {raw}"));
                }
            },
        };

        match action {
            CommandAction::Start => self.start(command).await,
            CommandAction::Cancel => self.cancel(command).await,
            CommandAction::Status => self.status(command).await,
        }
    }

    async fn start(self: &Arc<Self>, command: Command) -> CommandReply {
        let run_id = {
            let mut slots = self.slots.lock().await;
            let slot = &mut slots[command.index()];
            if slot.running {
                return CommandReply::new(ReplyStatus::AlreadyRunning, command).with_message(
                    format!("{} operation already in progress", command.display_name()),
                );
            }
            slot.running = true;
            slot.cancel = false;
            slot.started_at = Some(Instant::now());
            slot.run_id += 1;
            slot.run_id
        };

        let target = command.target_psi(&self.setpoints.get().await);
        info!(%command, target, run_id, "operation started");
        tokio::spawn(regulator::run(Arc::clone(self), command, target, run_id));

        CommandReply::new(ReplyStatus::Started, command)
            .with_message(format!("{} operation started", command.display_name()))
    }

    async fn cancel(&self, command: Command) -> CommandReply {
        {
            let mut slots = self.slots.lock().await;
            let slot = &mut slots[command.index()];
            if !slot.running {
                return CommandReply::new(ReplyStatus::NotRunning, command).with_message(format!(
                    "No {} operation in progress",
                    command.display_name()
                ));
            }
            slot.cancel = true;
            slot.running = false;
            slot.started_at = None;
        }

        self.set_valve(Valve::for_command(command), false).await;
        info!(%command, "operation cancelled");

        CommandReply::new(ReplyStatus::Cancelled, command)
            .with_message(format!("{} operation cancelled", command.display_name()))
    }

    async fn status(&self, command: Command) -> CommandReply {
        let slots = self.slots.lock().await;
        let slot = &slots[command.index()];
        if slot.running {
            CommandReply::new(ReplyStatus::Running, command)
                .with_time(slot.elapsed_secs(Instant::now()))
        } else {
            CommandReply::new(ReplyStatus::Idle, command).with_time(0.0)
        }
    }

    /// Samples pressure until it stops moving or `settle_max_wait` passes.
    pub async fn wait_for_stable_pressure(&self) -> f64 {
        let tuning = &self.tuning;
        let started = Instant::now();
        let mut last_psi = self.pressure().await;
        let mut last_check = started;
        tokio::time::sleep(tuning.settle_initial_delay).await;

        loop {
            let now = Instant::now();
            if now.duration_since(started) >= tuning.settle_max_wait {
                return self.pressure().await;
            }
            let since_check = now.duration_since(last_check);
            if since_check >= tuning.settle_check_interval {
                let current = self.pressure().await;
                let rate = (current - last_psi).abs() / since_check.as_secs_f64();
                if rate < tuning.stability_threshold {
                    return current;
                }
                last_psi = current;
                last_check = now;
            }
            tokio::time::sleep(settle_poll(tuning)).await;
        }
    }
}

fn settle_poll(tuning: &RegulatorTuning) -> Duration {
    tuning.valve_slice.min(tuning.settle_check_interval)
}

//! Drives a [`Reconciler`] from clicks and periodic polls, and fans the
//! resulting renders out to whichever front end is subscribed.

use std::{sync::Arc, time::Duration};

use shared::domain::{Command, CommandAction, Setpoints};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval, sleep, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    reconciler::{ClickOutcome, CommandState, Reconciler, RenderSink, RenderState, SampleOutcome},
    FirmwareApi, StatusSample,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub status_interval: Duration,
    pub pressure_interval: Duration,
    pub blocked_pulse: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(1),
            pressure_interval: Duration::from_secs(1),
            blocked_pulse: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Button {
        command: Command,
        state: RenderState,
        elapsed_secs: Option<f64>,
    },
    Pressure(f64),
    Setpoints(Setpoints),
    SetpointsSaved(Setpoints),
    RequestFailed {
        operation: &'static str,
        message: String,
    },
}

struct BroadcastSink<'a> {
    events: &'a broadcast::Sender<PanelEvent>,
}

impl RenderSink for BroadcastSink<'_> {
    fn render(&mut self, command: Command, state: RenderState, elapsed_secs: Option<f64>) {
        let _ = self.events.send(PanelEvent::Button {
            command,
            state,
            elapsed_secs,
        });
    }
}

pub struct ControlPanel {
    api: Arc<dyn FirmwareApi>,
    config: PanelConfig,
    reconciler: Mutex<Reconciler>,
    events: broadcast::Sender<PanelEvent>,
}

impl ControlPanel {
    pub fn new(api: Arc<dyn FirmwareApi>, config: PanelConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            api,
            config,
            reconciler: Mutex::new(Reconciler::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub async fn command_state(&self, command: Command) -> CommandState {
        self.reconciler.lock().await.state(command)
    }

    fn sink(&self) -> BroadcastSink<'_> {
        BroadcastSink {
            events: &self.events,
        }
    }

    /// Renders both buttons, loads setpoints and starts the poll timers.
    pub async fn start(self: &Arc<Self>) -> PanelTasks {
        self.reconciler.lock().await.render_all(&mut self.sink());
        let panel = Arc::clone(self);
        let setpoints = tokio::spawn(async move { panel.load_setpoints().await });
        let mut tasks = self.spawn_pollers();
        tasks.handles.push(setpoints);
        tasks
    }

    /// Renders the click immediately; the request itself is fire-and-forget.
    pub async fn click(self: &Arc<Self>, command: Command) -> ClickOutcome {
        let outcome = {
            let mut reconciler = self.reconciler.lock().await;
            reconciler.on_user_click(command, &mut self.sink())
        };

        match outcome {
            ClickOutcome::Submit(action) => self.submit(command, action),
            ClickOutcome::Blocked { blocker } => {
                info!(%command, %blocker, "command blocked while the other is active");
                self.schedule_pulse_clear(blocker);
            }
        }
        outcome
    }

    fn submit(&self, command: Command, action: CommandAction) {
        info!(%command, action = action.as_str(), "submitting command");
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.command(command, action).await {
                Ok(reply) => debug!(
                    %command,
                    action = action.as_str(),
                    status = reply.status.as_str(),
                    "command acknowledged"
                ),
                Err(err) => warn!(
                    %command,
                    action = action.as_str(),
                    %err,
                    "command request failed; next poll decides"
                ),
            }
        });
    }

    fn schedule_pulse_clear(self: &Arc<Self>, blocker: Command) {
        let panel = Arc::clone(self);
        tokio::spawn(async move {
            sleep(panel.config.blocked_pulse).await;
            let reconciler = panel.reconciler.lock().await;
            reconciler.restore(blocker, &mut panel.sink());
        });
    }

    pub async fn apply_sample(&self, command: Command, sample: StatusSample) -> SampleOutcome {
        let mut reconciler = self.reconciler.lock().await;
        let outcome = reconciler.on_status_sample(command, sample, &mut self.sink());
        if outcome == SampleOutcome::Discarded {
            debug!(%command, ?sample, "status sample disagrees with pending click; dropped");
        }
        outcome
    }

    pub async fn poll_status(&self, command: Command) -> Option<SampleOutcome> {
        match self.api.status(command).await {
            Ok(sample) => Some(self.apply_sample(command, sample).await),
            Err(err) => {
                debug!(%command, %err, "status poll produced no sample");
                None
            }
        }
    }

    pub async fn refresh_pressure(&self) {
        match self.api.pressure().await {
            Ok(psi) => {
                let _ = self.events.send(PanelEvent::Pressure(psi));
            }
            Err(err) => debug!(%err, "pressure refresh failed"),
        }
    }

    pub async fn load_setpoints(&self) {
        match self.api.setpoints().await {
            Ok(setpoints) => {
                let _ = self.events.send(PanelEvent::Setpoints(setpoints));
            }
            Err(err) => {
                warn!(%err, "failed to load setpoints");
                self.report_failure("load_setpoints", err.to_string());
            }
        }
    }

    pub async fn save_setpoints(&self, setpoints: Setpoints) {
        match self.api.save_setpoints(setpoints).await {
            Ok(()) => {
                info!(
                    onroad = setpoints.setpoint_onroad,
                    offroad = setpoints.setpoint_offroad,
                    "setpoints saved"
                );
                let _ = self.events.send(PanelEvent::SetpointsSaved(setpoints));
            }
            Err(err) => {
                warn!(%err, "failed to save setpoints");
                self.report_failure("save_setpoints", err.to_string());
            }
        }
    }

    fn report_failure(&self, operation: &'static str, message: String) {
        let _ = self
            .events
            .send(PanelEvent::RequestFailed { operation, message });
    }

    /// One repeating timer per command plus one for pressure, all unsynchronised.
    pub fn spawn_pollers(self: &Arc<Self>) -> PanelTasks {
        let mut handles = Vec::with_capacity(3);
        for command in Command::ALL {
            let panel = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(panel.config.status_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    panel.poll_status(command).await;
                }
            }));
        }

        let panel = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(panel.config.pressure_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                panel.refresh_pressure().await;
            }
        }));

        PanelTasks { handles }
    }
}

/// Background tasks owned by a running panel; dropping this stops them.
pub struct PanelTasks {
    handles: Vec<JoinHandle<()>>,
}

impl PanelTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for PanelTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/panel_tests.rs"]
mod tests;

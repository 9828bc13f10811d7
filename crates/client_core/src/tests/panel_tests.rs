use super::*;
use crate::{ClientError, Result};
use async_trait::async_trait;
use shared::protocol::{CommandReply, ReplyStatus};
use tokio::{
    sync::mpsc,
    time::{timeout, Duration},
};

const WAIT: Duration = Duration::from_secs(2);

struct FakeFirmware {
    calls: mpsc::UnboundedSender<(Command, CommandAction)>,
    statuses: Mutex<[Option<StatusSample>; 2]>,
    setpoints: Setpoints,
    reject_saves: bool,
}

impl FakeFirmware {
    fn new() -> (Self, mpsc::UnboundedReceiver<(Command, CommandAction)>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls,
                statuses: Mutex::new([Some(StatusSample::idle()), Some(StatusSample::idle())]),
                setpoints: Setpoints {
                    setpoint_onroad: 30.0,
                    setpoint_offroad: 12.0,
                },
                reject_saves: false,
            },
            rx,
        )
    }

    async fn report(&self, command: Command, sample: Option<StatusSample>) {
        self.statuses.lock().await[command.index()] = sample;
    }
}

#[async_trait]
impl FirmwareApi for FakeFirmware {
    async fn pressure(&self) -> Result<f64> {
        Ok(21.5)
    }

    async fn setpoints(&self) -> Result<Setpoints> {
        Ok(self.setpoints)
    }

    async fn save_setpoints(&self, _setpoints: Setpoints) -> Result<()> {
        if self.reject_saves {
            return Err(ClientError::HttpStatus {
                path: "/set_setpoints".to_string(),
                status: 500,
            });
        }
        Ok(())
    }

    async fn command(&self, command: Command, action: CommandAction) -> Result<CommandReply> {
        if action != CommandAction::Status {
            let _ = self.calls.send((command, action));
            return Ok(CommandReply::new(ReplyStatus::Started, command));
        }
        match self.statuses.lock().await[command.index()] {
            Some(sample) if sample.status == crate::SampleStatus::Running => {
                Ok(CommandReply::new(ReplyStatus::Running, command)
                    .with_time(sample.elapsed_secs.unwrap_or(0.0)))
            }
            Some(_) => Ok(CommandReply::new(ReplyStatus::Idle, command).with_time(0.0)),
            None => Err(ClientError::HttpStatus {
                path: command.route().to_string(),
                status: 503,
            }),
        }
    }
}

fn fast_config() -> PanelConfig {
    PanelConfig {
        status_interval: Duration::from_millis(10),
        pressure_interval: Duration::from_millis(10),
        blocked_pulse: Duration::from_millis(20),
    }
}

async fn wait_for(
    rx: &mut broadcast::Receiver<PanelEvent>,
    mut matches: impl FnMut(&PanelEvent) -> bool,
) -> PanelEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for panel event")
}

fn button(command: Command, state: RenderState, elapsed_secs: Option<f64>) -> PanelEvent {
    PanelEvent::Button {
        command,
        state,
        elapsed_secs,
    }
}

#[tokio::test]
async fn click_renders_starting_then_sends_start() {
    let (firmware, mut calls) = FakeFirmware::new();
    let panel = ControlPanel::new(Arc::new(firmware), fast_config());
    let mut events = panel.subscribe();

    let outcome = panel.click(Command::AirUp).await;

    assert_eq!(outcome, ClickOutcome::Submit(CommandAction::Start));
    assert_eq!(
        events.try_recv().expect("render is synchronous"),
        button(Command::AirUp, RenderState::Starting, None)
    );
    let call = timeout(WAIT, calls.recv())
        .await
        .expect("request sent")
        .expect("call");
    assert_eq!(call, (Command::AirUp, CommandAction::Start));
}

#[tokio::test]
async fn blocked_click_sends_nothing_and_pulse_reverts() {
    let (firmware, mut calls) = FakeFirmware::new();
    let panel = ControlPanel::new(Arc::new(firmware), fast_config());
    panel
        .apply_sample(Command::AirDown, StatusSample::running(4.0))
        .await;
    let before = panel.command_state(Command::AirUp).await;
    let mut events = panel.subscribe();

    let outcome = panel.click(Command::AirUp).await;

    assert_eq!(
        outcome,
        ClickOutcome::Blocked {
            blocker: Command::AirDown
        }
    );
    assert_eq!(
        events.try_recv().expect("pulse"),
        button(Command::AirDown, RenderState::Blocked, None)
    );
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, PanelEvent::Button { .. })).await,
        button(Command::AirDown, RenderState::Running, Some(4.0))
    );
    assert_eq!(panel.command_state(Command::AirUp).await, before);
    assert!(calls.try_recv().is_err());
}

#[tokio::test]
async fn polls_ignore_stale_status_until_firmware_catches_up() {
    let (firmware, _calls) = FakeFirmware::new();
    let firmware = Arc::new(firmware);
    let panel = ControlPanel::new(firmware.clone(), fast_config());

    panel.click(Command::AirUp).await;
    assert_eq!(
        panel.poll_status(Command::AirUp).await,
        Some(SampleOutcome::Discarded)
    );

    firmware
        .report(Command::AirUp, Some(StatusSample::running(1.5)))
        .await;
    let mut events = panel.subscribe();
    assert_eq!(
        panel.poll_status(Command::AirUp).await,
        Some(SampleOutcome::Confirmed)
    );
    assert_eq!(
        events.try_recv().expect("render"),
        button(Command::AirUp, RenderState::Running, Some(1.5))
    );
    let state = panel.command_state(Command::AirUp).await;
    assert!(state.active);
    assert!(!state.is_pending());
}

#[tokio::test]
async fn failed_poll_leaves_transitional_state_alone() {
    let (firmware, _calls) = FakeFirmware::new();
    let firmware = Arc::new(firmware);
    let panel = ControlPanel::new(firmware.clone(), fast_config());
    panel.click(Command::AirDown).await;
    firmware.report(Command::AirDown, None).await;
    let mut events = panel.subscribe();

    assert_eq!(panel.poll_status(Command::AirDown).await, None);

    assert!(events.try_recv().is_err());
    assert!(panel.command_state(Command::AirDown).await.is_pending());
}

#[tokio::test]
async fn pollers_keep_both_commands_and_pressure_fresh() {
    let (firmware, _calls) = FakeFirmware::new();
    let firmware = Arc::new(firmware);
    firmware
        .report(Command::AirDown, Some(StatusSample::running(3.0)))
        .await;
    let panel = ControlPanel::new(firmware.clone(), fast_config());
    let mut events = panel.subscribe();

    let tasks = panel.spawn_pollers();
    assert_eq!(tasks.len(), 3);

    wait_for(&mut events, |event| {
        *event == button(Command::AirDown, RenderState::Running, Some(3.0))
    })
    .await;
    wait_for(&mut events, |event| {
        *event == button(Command::AirUp, RenderState::Idle, None)
    })
    .await;
    wait_for(&mut events, |event| *event == PanelEvent::Pressure(21.5)).await;
    drop(tasks);
}

#[tokio::test]
async fn start_renders_idle_buttons_and_loads_setpoints() {
    let (firmware, _calls) = FakeFirmware::new();
    let panel = ControlPanel::new(Arc::new(firmware), PanelConfig::default());
    let mut events = panel.subscribe();

    let _tasks = panel.start().await;

    assert_eq!(
        events.try_recv().expect("first render"),
        button(Command::AirUp, RenderState::Idle, None)
    );
    assert_eq!(
        events.try_recv().expect("second render"),
        button(Command::AirDown, RenderState::Idle, None)
    );
    let loaded = wait_for(&mut events, |event| matches!(event, PanelEvent::Setpoints(_))).await;
    assert_eq!(
        loaded,
        PanelEvent::Setpoints(Setpoints {
            setpoint_onroad: 30.0,
            setpoint_offroad: 12.0,
        })
    );
}

#[tokio::test]
async fn save_setpoints_reports_ack_or_failure() {
    let (firmware, _calls) = FakeFirmware::new();
    let panel = ControlPanel::new(Arc::new(firmware), fast_config());
    let mut events = panel.subscribe();
    let setpoints = Setpoints {
        setpoint_onroad: 35.0,
        setpoint_offroad: 18.0,
    };

    panel.save_setpoints(setpoints).await;
    assert_eq!(
        events.try_recv().expect("saved"),
        PanelEvent::SetpointsSaved(setpoints)
    );

    let (mut rejecting, _calls) = FakeFirmware::new();
    rejecting.reject_saves = true;
    let panel = ControlPanel::new(Arc::new(rejecting), fast_config());
    let mut events = panel.subscribe();
    panel.save_setpoints(setpoints).await;
    match events.try_recv().expect("failure") {
        PanelEvent::RequestFailed { operation, message } => {
            assert_eq!(operation, "save_setpoints");
            assert!(message.contains("500"), "unexpected message: {message}");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

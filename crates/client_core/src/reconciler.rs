//! Click/poll reconciliation for the two pneumatic commands.
//!
//! A click renders its intent immediately and records the state the firmware
//! is expected to reach. Status samples that disagree with a pending
//! expectation are dropped, so a poll that left before the click cannot flip
//! the button back. Once a sample confirms the expectation the command goes
//! back to trusting every sample verbatim.

use shared::domain::{Command, CommandAction, Setpoints};

/// What the reconciler is waiting for the firmware to report.
///
/// Clicks only ever record `Running` or `Idle`; the transitional values exist
/// so a caller can express any render state as an expectation, and a status
/// sample can never satisfy them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedState {
    #[default]
    Live,
    Idle,
    Starting,
    Running,
    Cancelling,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandState {
    pub active: bool,
    pub expected: ExpectedState,
}

impl CommandState {
    pub fn is_pending(&self) -> bool {
        self.expected != ExpectedState::Live
    }

    fn accepts(&self, status: SampleStatus) -> bool {
        match self.expected {
            ExpectedState::Live => true,
            ExpectedState::Running => status == SampleStatus::Running,
            ExpectedState::Idle => status == SampleStatus::Idle,
            ExpectedState::Starting | ExpectedState::Cancelling | ExpectedState::Blocked => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    Running,
    Idle,
}

/// A point-in-time status for one command, as reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSample {
    pub status: SampleStatus,
    pub elapsed_secs: Option<f64>,
}

impl StatusSample {
    pub fn running(elapsed_secs: f64) -> Self {
        Self {
            status: SampleStatus::Running,
            elapsed_secs: Some(elapsed_secs),
        }
    }

    pub fn idle() -> Self {
        Self {
            status: SampleStatus::Idle,
            elapsed_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Starting,
    Running,
    Cancelling,
    Blocked,
}

/// The last thing rendered for a button, kept so a blocked pulse can be undone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonView {
    pub state: RenderState,
    pub elapsed_secs: Option<f64>,
}

impl Default for ButtonView {
    fn default() -> Self {
        Self::idle()
    }
}

impl ButtonView {
    pub fn new(state: RenderState, elapsed_secs: Option<f64>) -> Self {
        Self {
            state,
            elapsed_secs,
        }
    }

    pub fn idle() -> Self {
        Self::new(RenderState::Idle, None)
    }

    pub fn running(elapsed_secs: f64) -> Self {
        Self::new(RenderState::Running, Some(elapsed_secs))
    }

    pub fn elapsed_whole_secs(&self) -> u64 {
        self.elapsed_secs.unwrap_or(0.0).max(0.0).round() as u64
    }

    /// Button caption; `setpoints` fills in the target pressure when known.
    pub fn label(&self, command: Command, setpoints: Option<&Setpoints>) -> String {
        match self.state {
            RenderState::Idle | RenderState::Starting | RenderState::Blocked => match setpoints {
                Some(setpoints) => format!(
                    "{} to {} psi",
                    command.display_name(),
                    command.target_psi(setpoints)
                ),
                None => command.display_name().to_string(),
            },
            RenderState::Running => format!("Cancel ({}s)", self.elapsed_whole_secs()),
            RenderState::Cancelling => "Cancelling...".to_string(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        match self.state {
            RenderState::Idle | RenderState::Running | RenderState::Blocked => true,
            RenderState::Starting | RenderState::Cancelling => false,
        }
    }
}

/// Presentation boundary. Implementations must not call back into the reconciler.
pub trait RenderSink {
    fn render(&mut self, command: Command, state: RenderState, elapsed_secs: Option<f64>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The other command holds the lock; it was pulsed and nothing was sent.
    Blocked { blocker: Command },
    /// The click was rendered and this request should go out.
    Submit(CommandAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// No transition was pending; the sample was rendered as-is.
    Applied,
    /// The sample matched a pending expectation, which is now cleared.
    Confirmed,
    /// The sample contradicted a pending expectation and was dropped.
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    states: [CommandState; 2],
    views: [ButtonView; 2],
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, command: Command) -> CommandState {
        self.states[command.index()]
    }

    pub fn view(&self, command: Command) -> ButtonView {
        self.views[command.index()]
    }

    pub fn render_all(&self, sink: &mut impl RenderSink) {
        for command in Command::ALL {
            self.restore(command, sink);
        }
    }

    pub fn on_user_click(&mut self, command: Command, sink: &mut impl RenderSink) -> ClickOutcome {
        let blocker = command.other();
        if self.states[blocker.index()].active {
            sink.render(blocker, RenderState::Blocked, None);
            return ClickOutcome::Blocked { blocker };
        }

        let state = &mut self.states[command.index()];
        let (action, view) = if state.active {
            state.active = false;
            state.expected = ExpectedState::Idle;
            (
                CommandAction::Cancel,
                ButtonView::new(RenderState::Cancelling, None),
            )
        } else {
            state.active = true;
            state.expected = ExpectedState::Running;
            (
                CommandAction::Start,
                ButtonView::new(RenderState::Starting, None),
            )
        };
        self.show(command, view, sink);
        ClickOutcome::Submit(action)
    }

    pub fn on_status_sample(
        &mut self,
        command: Command,
        sample: StatusSample,
        sink: &mut impl RenderSink,
    ) -> SampleOutcome {
        let state = &mut self.states[command.index()];
        if !state.accepts(sample.status) {
            return SampleOutcome::Discarded;
        }

        let outcome = if state.is_pending() {
            SampleOutcome::Confirmed
        } else {
            SampleOutcome::Applied
        };
        state.expected = ExpectedState::Live;
        let view = match sample.status {
            SampleStatus::Running => {
                state.active = true;
                ButtonView::running(sample.elapsed_secs.unwrap_or(0.0))
            }
            SampleStatus::Idle => {
                state.active = false;
                ButtonView::idle()
            }
        };
        self.show(command, view, sink);
        outcome
    }

    /// Re-renders the last non-pulse view, ending a blocked highlight.
    pub fn restore(&self, command: Command, sink: &mut impl RenderSink) {
        let view = self.views[command.index()];
        sink.render(command, view.state, view.elapsed_secs);
    }

    fn show(&mut self, command: Command, view: ButtonView, sink: &mut impl RenderSink) {
        self.views[command.index()] = view;
        sink.render(command, view.state, view.elapsed_secs);
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;

use super::*;

use shared::domain::{CommandAction, Setpoints};

use crate::{pneumatics::Pneumatics, setpoints::SetpointStore};

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

#[test]
fn within_tolerance_reports_target_reached() {
    let mut learning = Learning::default();
    let step = plan(
        Command::AirUp,
        32.0,
        31.6,
        Instant::now(),
        &mut learning,
        &RegulatorTuning::default(),
    );
    assert_eq!(step, Step::TargetReached);
    assert_eq!(learning, Learning::default());
}

#[test]
fn passing_the_target_reports_overshoot() {
    let tuning = RegulatorTuning::default();
    let mut learning = Learning::default();
    let now = Instant::now();

    assert_eq!(
        plan(Command::AirUp, 32.0, 33.0, now, &mut learning, &tuning),
        Step::Overshot
    );
    assert_eq!(
        plan(Command::AirDown, 14.0, 13.0, now, &mut learning, &tuning),
        Step::Overshot
    );
}

#[test]
fn first_step_uses_default_valve_time() {
    let tuning = RegulatorTuning::default();
    let mut learning = Learning::default();
    let now = Instant::now();

    let step = plan(Command::AirDown, 14.0, 25.0, now, &mut learning, &tuning);

    assert_eq!(
        step,
        Step::Open {
            valve: Valve::Vent,
            duration: tuning.default_valve,
        }
    );
    assert_eq!(learning.last_psi, Some(25.0));
    assert_eq!(learning.last_action_at, Some(now));
    assert_eq!(learning.observed_rate, None);
}

#[test]
fn rate_is_learned_then_smoothed() {
    let tuning = RegulatorTuning::default();
    let start = Instant::now();
    let mut learning = Learning::default();

    plan(Command::AirUp, 32.0, 20.0, start, &mut learning, &tuning);
    // 4 psi over 2 s.
    plan(Command::AirUp, 32.0, 24.0, start + secs(2.0), &mut learning, &tuning);
    assert_eq!(learning.observed_rate, Some(2.0));

    // 1 psi over 2 s, blended 70/30.
    plan(Command::AirUp, 32.0, 25.0, start + secs(4.0), &mut learning, &tuning);
    let rate = learning.observed_rate.expect("rate");
    assert!((rate - 1.55).abs() < 1e-9, "got {rate}");
}

#[test]
fn movement_in_the_wrong_direction_is_not_learned() {
    let tuning = RegulatorTuning::default();
    let start = Instant::now();
    let mut learning = Learning::default();

    plan(Command::AirUp, 32.0, 20.0, start, &mut learning, &tuning);
    plan(Command::AirUp, 32.0, 19.0, start + secs(2.0), &mut learning, &tuning);

    assert_eq!(learning.observed_rate, None);
}

#[test]
fn samples_inside_the_rate_window_are_not_learned() {
    let tuning = RegulatorTuning::default();
    let start = Instant::now();
    let mut learning = Learning::default();

    plan(Command::AirUp, 32.0, 20.0, start, &mut learning, &tuning);
    plan(Command::AirUp, 32.0, 22.0, start + secs(0.5), &mut learning, &tuning);

    assert_eq!(learning.observed_rate, None);
}

#[test]
fn valve_time_scales_with_error_and_clamps() {
    let tuning = RegulatorTuning::default();

    // 10 psi * 0.8 / 2 psi/s = 4 s.
    assert_eq!(
        valve_time(Command::AirUp, 10.0, Some(2.0), &tuning),
        secs(4.0)
    );
    assert_eq!(
        valve_time(Command::AirUp, 100.0, Some(0.1), &tuning),
        tuning.max_valve_up
    );
    assert_eq!(
        valve_time(Command::AirDown, -100.0, Some(0.1), &tuning),
        tuning.max_valve_down
    );
    assert_eq!(
        valve_time(Command::AirUp, 1.5, Some(50.0), &tuning),
        tuning.min_valve
    );
}

#[test]
fn valve_time_pulses_near_target_and_defaults_without_rate() {
    let tuning = RegulatorTuning::default();

    assert_eq!(
        valve_time(Command::AirUp, 0.8, Some(2.0), &tuning),
        tuning.min_valve
    );
    assert_eq!(
        valve_time(Command::AirUp, 10.0, None, &tuning),
        tuning.default_valve
    );
    assert_eq!(
        valve_time(Command::AirUp, 10.0, Some(0.001), &tuning),
        tuning.default_valve
    );
}

fn fast_tuning() -> RegulatorTuning {
    RegulatorTuning {
        rate_window: Duration::from_millis(20),
        default_valve: Duration::from_millis(60),
        min_valve: Duration::from_millis(10),
        max_valve_up: Duration::from_millis(300),
        max_valve_down: Duration::from_millis(300),
        valve_slice: Duration::from_millis(5),
        settle_initial_delay: Duration::from_millis(5),
        settle_check_interval: Duration::from_millis(10),
        settle_max_wait: Duration::from_millis(40),
        ..RegulatorTuning::default()
    }
}

async fn firmware_with(
    dir: &tempfile::TempDir,
    initial_psi: f64,
    setpoints: Setpoints,
    tuning: RegulatorTuning,
) -> Arc<Firmware> {
    let store = SetpointStore::open(dir.path().join("setpoints.json")).await;
    store.set(setpoints).await.expect("save setpoints");
    Firmware::new(
        Pneumatics::new(initial_psi, 20.0, 20.0, Instant::now()),
        store,
        tuning,
    )
}

async fn wait_until_idle(firmware: &Firmware, command: Command) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while firmware.is_running(command).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("regulator should finish");
}

#[tokio::test]
async fn air_up_run_converges_on_onroad_setpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let firmware = firmware_with(
        &dir,
        10.0,
        Setpoints {
            setpoint_onroad: 14.0,
            setpoint_offroad: 5.0,
        },
        fast_tuning(),
    )
    .await;

    firmware
        .handle(Command::AirUp, Some(CommandAction::Start.as_str()))
        .await;
    wait_until_idle(&firmware, Command::AirUp).await;

    let psi = firmware.pressure().await;
    assert!(psi >= 13.5, "pressure {psi} should reach the setpoint band");
}

#[tokio::test]
async fn cancel_closes_the_valve_and_stops_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tuning = RegulatorTuning {
        default_valve: Duration::from_secs(10),
        ..fast_tuning()
    };
    let firmware = firmware_with(&dir, 20.0, Setpoints::default(), tuning).await;

    firmware.handle(Command::AirDown, None).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    firmware.handle(Command::AirDown, Some("cancel")).await;

    let after_cancel = firmware.pressure().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!firmware.is_running(Command::AirDown).await);
    assert_eq!(firmware.pressure().await, after_cancel);
    assert!(after_cancel < 20.0, "vent valve should have opened");
}

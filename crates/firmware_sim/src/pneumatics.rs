use std::time::Instant;

use shared::domain::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valve {
    /// Admits compressed air.
    Fill,
    /// Releases air to atmosphere.
    Vent,
}

impl Valve {
    pub fn for_command(command: Command) -> Self {
        match command {
            Command::AirUp => Self::Fill,
            Command::AirDown => Self::Vent,
        }
    }
}

/// Simulated air spring: pressure moves linearly while a valve is open.
///
/// Pressure is integrated lazily up to the instant it is observed or a valve
/// changes, so no background tick is needed.
#[derive(Debug, Clone)]
pub struct Pneumatics {
    pressure_psi: f64,
    fill_rate: f64,
    vent_rate: f64,
    fill_open: bool,
    vent_open: bool,
    updated_at: Instant,
}

impl Pneumatics {
    pub fn new(initial_psi: f64, fill_rate: f64, vent_rate: f64, now: Instant) -> Self {
        Self {
            pressure_psi: initial_psi.max(0.0),
            fill_rate,
            vent_rate,
            fill_open: false,
            vent_open: false,
            updated_at: now,
        }
    }

    pub fn pressure_at(&mut self, now: Instant) -> f64 {
        self.advance_to(now);
        self.pressure_psi
    }

    pub fn set_valve(&mut self, valve: Valve, open: bool, now: Instant) {
        self.advance_to(now);
        match valve {
            Valve::Fill => self.fill_open = open,
            Valve::Vent => self.vent_open = open,
        }
    }

    #[cfg(test)]
    pub fn is_open(&self, valve: Valve) -> bool {
        match valve {
            Valve::Fill => self.fill_open,
            Valve::Vent => self.vent_open,
        }
    }

    fn advance_to(&mut self, now: Instant) {
        let secs = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.updated_at = self.updated_at.max(now);
        if self.fill_open {
            self.pressure_psi += self.fill_rate * secs;
        }
        if self.vent_open {
            self.pressure_psi -= self.vent_rate * secs;
        }
        self.pressure_psi = self.pressure_psi.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn pressure_holds_with_valves_closed() {
        let start = Instant::now();
        let mut tank = Pneumatics::new(20.0, 2.0, 1.0, start);
        assert_eq!(tank.pressure_at(start + Duration::from_secs(30)), 20.0);
    }

    #[test]
    fn fill_valve_raises_pressure_at_fill_rate() {
        let start = Instant::now();
        let mut tank = Pneumatics::new(20.0, 2.0, 1.0, start);
        tank.set_valve(Valve::Fill, true, start);
        tank.set_valve(Valve::Fill, false, start + Duration::from_millis(1500));

        let psi = tank.pressure_at(start + Duration::from_secs(10));

        assert!((psi - 23.0).abs() < 1e-9, "got {psi}");
        assert!(!tank.is_open(Valve::Fill));
    }

    #[test]
    fn venting_never_goes_below_zero() {
        let start = Instant::now();
        let mut tank = Pneumatics::new(1.0, 2.0, 1.0, start);
        tank.set_valve(Valve::Vent, true, start);

        assert_eq!(tank.pressure_at(start + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn commands_map_to_their_valves() {
        assert_eq!(Valve::for_command(Command::AirUp), Valve::Fill);
        assert_eq!(Valve::for_command(Command::AirDown), Valve::Vent);
    }
}

//! Drive assists layered on top of raw control demands
//!
//! The same policy object serves every contestant kind: human players get
//! automatic gears and reverse by configuration, AI drivers always shift
//! automatically, and any kind may opt into the off-track penalty.

use serde::{Deserialize, Serialize};

use super::physics::{CarPhysics, Controls, CAR_GEARS, REVERSE_GEAR};

/// Below this speed (m/s) the car counts as stopped for auto-reverse
pub const STOP_SPEED: f32 = 0.5;

/// Off-track penalty thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRules {
    /// Speed above which off-track driving is penalized (m/s)
    pub warning_speed: f32,
    /// How long the car may stay off track above the warning speed (s)
    pub warning_duration: f32,
    /// How long drive is cut once the penalty triggers (s)
    pub penalty_duration: f32,
}

impl Default for PenaltyRules {
    fn default() -> Self {
        Self {
            warning_speed: 15.0,
            warning_duration: 1.5,
            penalty_duration: 3.0,
        }
    }
}

/// Which assists are enabled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveAssist {
    pub auto_gears: bool,
    pub auto_reverse: bool,
    pub off_track_penalty: bool,
    #[serde(default)]
    pub penalty: PenaltyRules,
}

impl DriveAssist {
    /// Assists a human player gets by default
    pub fn casual() -> Self {
        Self {
            auto_gears: true,
            auto_reverse: true,
            off_track_penalty: true,
            penalty: PenaltyRules::default(),
        }
    }

    /// Manual gearbox, no reverse help, penalty still enforced
    pub fn manual() -> Self {
        Self {
            auto_gears: false,
            auto_reverse: false,
            off_track_penalty: true,
            penalty: PenaltyRules::default(),
        }
    }

    /// What AI drivers use: they shift automatically and handle reverse themselves
    pub fn ai() -> Self {
        Self {
            auto_gears: true,
            auto_reverse: false,
            off_track_penalty: false,
            penalty: PenaltyRules::default(),
        }
    }
}

impl Default for DriveAssist {
    fn default() -> Self {
        Self::casual()
    }
}

/// Penalty transitions reported after physics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyEvent {
    Started,
    Ended,
}

/// Per-contestant assist state
#[derive(Debug, Clone, PartialEq)]
pub struct Assist {
    config: DriveAssist,
    off_track_time: f32,
    penalty_remaining: f32,
}

impl Assist {
    pub fn new(config: DriveAssist) -> Self {
        Self {
            config,
            off_track_time: 0.0,
            penalty_remaining: 0.0,
        }
    }

    pub fn config(&self) -> &DriveAssist {
        &self.config
    }

    pub fn penalty_active(&self) -> bool {
        self.penalty_remaining > 0.0
    }

    pub fn penalty_remaining(&self) -> f32 {
        self.penalty_remaining
    }

    /// Turn a raw demand into this tick's controls and store them on the car
    pub fn before_physics(&self, car: &mut CarPhysics, demand: Controls) {
        let mut controls = demand.clamped();

        if self.config.auto_reverse {
            let stopped = car.speed().abs() < STOP_SPEED;
            let wants_forward = controls.accelerator > 0.0 && controls.brakes == 0.0;
            let wants_backward = controls.brakes > 0.0 && controls.accelerator == 0.0;

            if car.gear() == REVERSE_GEAR && stopped && wants_forward {
                car.set_gear(1);
            } else if stopped && wants_backward {
                // Reverse is only reachable from neutral; step down first
                match car.gear() {
                    g if g > 0 => car.set_gear(0),
                    0 => car.set_gear(REVERSE_GEAR),
                    _ => {}
                }
            }

            // In reverse the pedal toward the direction of travel is the brake key
            if car.gear() == REVERSE_GEAR {
                std::mem::swap(&mut controls.accelerator, &mut controls.brakes);
            }
        }

        if self.config.auto_gears && controls.gear_change == 0 {
            controls.gear_change = auto_shift(car, controls.accelerator);
        }

        if self.penalty_active() {
            controls.accelerator = 0.0;
        }

        car.controls = controls;
    }

    /// Track off-track time and run the penalty clock
    pub fn after_physics(&mut self, car: &CarPhysics, dt: f32) -> Option<PenaltyEvent> {
        if !self.config.off_track_penalty || !dt.is_finite() || dt <= 0.0 {
            return None;
        }

        if self.penalty_active() {
            self.penalty_remaining -= dt;
            if self.penalty_remaining <= 0.0 {
                self.penalty_remaining = 0.0;
                return Some(PenaltyEvent::Ended);
            }
            return None;
        }

        let rules = &self.config.penalty;
        if !car.is_on_track() && car.speed().abs() > rules.warning_speed {
            self.off_track_time += dt;
            if self.off_track_time >= rules.warning_duration {
                self.off_track_time = 0.0;
                self.penalty_remaining = rules.penalty_duration;
                return Some(PenaltyEvent::Started);
            }
        } else {
            self.off_track_time = 0.0;
        }
        None
    }

    /// Clear timers, e.g. on a restart
    pub fn reset(&mut self) {
        self.off_track_time = 0.0;
        self.penalty_remaining = 0.0;
    }
}

/// Gear change the automatic gearbox wants this tick
fn auto_shift(car: &CarPhysics, accelerator: f32) -> i8 {
    let spec = car.spec();
    match car.gear() {
        0 if accelerator > 0.0 => 1,
        g if g >= 1 && g < CAR_GEARS && car.rpm() >= spec.shift_up_rpm => 1,
        g if g > 1 && car.rpm() <= spec.shift_down_rpm => -1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::physics::{CarClass, CarSpec};

    fn car() -> CarPhysics {
        CarPhysics::new(CarSpec::for_class(CarClass::Sport))
    }

    fn throttle() -> Controls {
        Controls {
            accelerator: 1.0,
            ..Controls::default()
        }
    }

    fn brake() -> Controls {
        Controls {
            brakes: 1.0,
            ..Controls::default()
        }
    }

    #[test]
    fn auto_gears_engage_first_and_shift_up() {
        let assist = Assist::new(DriveAssist::casual());
        let mut car = car();
        let mut top_gear = 0;
        for _ in 0..1500 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
            top_gear = top_gear.max(car.gear());
        }
        assert!(top_gear >= 3, "reached gear {top_gear}");
        assert!(car.speed() > car.spec().top_speed(1));
    }

    #[test]
    fn auto_gears_shift_down_when_slowing() {
        let assist = Assist::new(DriveAssist {
            auto_reverse: false,
            ..DriveAssist::casual()
        });
        let mut car = car();
        for _ in 0..1500 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
        }
        let high = car.gear();
        let half_brake = Controls {
            brakes: 0.5,
            ..Controls::default()
        };
        for _ in 0..200 {
            assist.before_physics(&mut car, half_brake);
            car.update_physics(0.02);
        }
        assert!(car.gear() < high);
        assert!(car.gear() >= 1);
    }

    #[test]
    fn manual_box_stays_in_neutral() {
        let assist = Assist::new(DriveAssist::manual());
        let mut car = car();
        for _ in 0..50 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
        }
        assert_eq!(car.gear(), 0);
        assert_eq!(car.speed(), 0.0);
    }

    #[test]
    fn auto_reverse_engages_on_brake_at_standstill_and_returns() {
        let assist = Assist::new(DriveAssist::casual());
        let mut car = car();
        for _ in 0..100 {
            assist.before_physics(&mut car, brake());
            car.update_physics(0.02);
        }
        assert_eq!(car.gear(), REVERSE_GEAR);
        assert!(car.speed() < -1.0);

        // Accelerator brakes the reversing car, then selects first gear once stopped
        for _ in 0..200 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
        }
        assert!(car.gear() >= 1);
        assert!(car.speed() > 0.0);
    }

    #[test]
    fn auto_reverse_steps_through_neutral() {
        let assist = Assist::new(DriveAssist::casual());
        let mut car = car();
        car.set_gear(1);

        assist.before_physics(&mut car, brake());
        assert_eq!(car.gear(), 0);
        car.update_physics(0.02);

        assist.before_physics(&mut car, brake());
        assert_eq!(car.gear(), REVERSE_GEAR);
    }

    #[test]
    fn auto_reverse_does_not_trigger_while_moving() {
        let assist = Assist::new(DriveAssist::casual());
        let mut car = car();
        for _ in 0..100 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
        }
        assist.before_physics(&mut car, brake());
        assert!(car.gear() >= 1);
        assert_eq!(car.controls.brakes, 1.0);
    }

    #[test]
    fn off_track_penalty_cuts_drive_then_releases() {
        let config = DriveAssist {
            penalty: PenaltyRules {
                warning_speed: 5.0,
                warning_duration: 1.0,
                penalty_duration: 2.0,
            },
            ..DriveAssist::casual()
        };
        let mut assist = Assist::new(config);
        let mut car = car();
        car.set_gear(1);
        car.set_kinematics(crate::race::physics::Kinematics {
            speed: 10.0,
            ..Default::default()
        });
        car.set_on_track(false);

        let mut started_at = None;
        for tick in 0..60 {
            assist.before_physics(&mut car, throttle());
            car.update_physics(0.02);
            if assist.after_physics(&car, 0.02) == Some(PenaltyEvent::Started) {
                started_at = Some(tick);
                break;
            }
        }
        let started_at = started_at.expect("penalty should trigger");
        assert!(started_at >= 49);
        assert!(assist.penalty_active());

        // Drive is cut for the whole window, then released automatically
        let mut penalty_ticks = 0;
        loop {
            assist.before_physics(&mut car, throttle());
            assert_eq!(car.controls.accelerator, 0.0);
            car.update_physics(0.02);
            penalty_ticks += 1;
            if assist.after_physics(&car, 0.02) == Some(PenaltyEvent::Ended) {
                break;
            }
            assert!(penalty_ticks < 150, "penalty never released");
        }
        assert!((99..=101).contains(&penalty_ticks), "{penalty_ticks} ticks");
        assert!(!assist.penalty_active());

        assist.before_physics(&mut car, throttle());
        assert_eq!(car.controls.accelerator, 1.0);
    }

    #[test]
    fn slow_off_track_driving_is_not_penalized() {
        let mut assist = Assist::new(DriveAssist::casual());
        let mut car = car();
        car.set_on_track(false);
        for _ in 0..500 {
            assert_eq!(assist.after_physics(&car, 0.02), None);
        }
        assert!(!assist.penalty_active());
    }
}

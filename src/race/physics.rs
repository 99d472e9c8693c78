//! Car physics: engine, gearbox, braking, steering and slip

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::math::{approach, heading_vector, wrap_angle};

/// Number of forward gears
pub const CAR_GEARS: i8 = 6;

/// Reverse gear index
pub const REVERSE_GEAR: i8 = -1;

/// Car classes available on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarClass {
    /// Light and forgiving
    Compact,
    /// Balanced
    #[default]
    Sport,
    /// Fast, nervous at the limit
    Formula,
}

/// Physics constants per car class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarSpec {
    /// Forward gear ratios, first gear first
    pub gear_ratios: [f32; CAR_GEARS as usize],
    pub reverse_ratio: f32,
    /// Engine revolutions per (m/s * gear ratio)
    pub rpm_per_mps: f32,
    pub idle_rpm: f32,
    pub peak_rpm: f32,
    pub max_rpm: f32,
    /// Auto-gear shift thresholds
    pub shift_up_rpm: f32,
    pub shift_down_rpm: f32,
    /// Drive acceleration at peak torque in first gear (m/s^2)
    pub max_accel: f32,
    /// Braking deceleration at full pedal (m/s^2)
    pub brake_decel: f32,
    /// Aerodynamic drag coefficient (per meter)
    pub drag: f32,
    /// Rolling resistance (per second)
    pub rolling: f32,
    /// Additional rolling resistance off track (per second)
    pub off_track_rolling: f32,
    /// Turn rate per meter of travel at full lock
    pub steer_rate: f32,
    /// Speed at which steering authority starts fading (m/s)
    pub steer_fade_speed: f32,
    /// How quickly angular speed follows the steering target (per second)
    pub steer_response: f32,
    /// Lateral acceleration the tyres hold before sliding (m/s^2)
    pub lateral_grip: f32,
    /// How quickly travel direction follows orientation on track (per second)
    pub grip_rate: f32,
    /// Fraction of grip kept off track
    pub off_track_grip: f32,
}

impl CarSpec {
    pub fn for_class(class: CarClass) -> Self {
        let base = Self {
            gear_ratios: [3.2, 2.3, 1.75, 1.35, 1.1, 0.92],
            reverse_ratio: 3.0,
            rpm_per_mps: 95.6,
            idle_rpm: 900.0,
            peak_rpm: 5000.0,
            max_rpm: 7500.0,
            shift_up_rpm: 7000.0,
            shift_down_rpm: 3500.0,
            max_accel: 9.0,
            brake_decel: 14.0,
            drag: 0.0003,
            rolling: 0.015,
            off_track_rolling: 0.4,
            steer_rate: 0.12,
            steer_fade_speed: 25.0,
            steer_response: 10.0,
            lateral_grip: 14.0,
            grip_rate: 12.0,
            off_track_grip: 0.3,
        };
        match class {
            CarClass::Compact => Self {
                max_accel: 7.5,
                drag: 0.0004,
                steer_rate: 0.14,
                lateral_grip: 12.0,
                grip_rate: 14.0,
                ..base
            },
            CarClass::Sport => base,
            CarClass::Formula => Self {
                gear_ratios: [3.0, 2.2, 1.7, 1.3, 1.05, 0.85],
                max_accel: 11.0,
                brake_decel: 18.0,
                drag: 0.00025,
                lateral_grip: 18.0,
                grip_rate: 10.0,
                off_track_grip: 0.2,
                ..base
            },
        }
    }

    fn ratio(&self, gear: i8) -> f32 {
        match gear {
            g if g > 0 => self.gear_ratios[(g.min(CAR_GEARS) - 1) as usize],
            REVERSE_GEAR => self.reverse_ratio,
            _ => 0.0,
        }
    }

    /// Speed at which the rev limiter cuts in for a gear
    pub fn top_speed(&self, gear: i8) -> f32 {
        let ratio = self.ratio(gear);
        if ratio <= 0.0 {
            return f32::INFINITY;
        }
        (self.max_rpm - self.idle_rpm) / (ratio * self.rpm_per_mps)
    }

    /// Normalized torque (0..1) at an engine speed
    fn torque(&self, rpm: f32) -> f32 {
        if rpm >= self.max_rpm {
            return 0.0;
        }
        let span = self.max_rpm - self.idle_rpm;
        let off_peak = (rpm - self.peak_rpm) / span;
        (1.0 - 1.5 * off_peak * off_peak).clamp(0.35, 1.0)
    }
}

/// Driver inputs for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Controls {
    /// 0..1
    pub accelerator: f32,
    /// 0..1
    pub brakes: f32,
    /// -1 (left) .. 1 (right)
    pub steering: f32,
    /// -1, 0 or 1
    pub gear_change: i8,
}

impl Controls {
    /// Clamp every input into range; non-finite inputs become zero
    pub fn clamped(self) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            accelerator: finite(self.accelerator).clamp(0.0, 1.0),
            brakes: finite(self.brakes).clamp(0.0, 1.0),
            steering: finite(self.steering).clamp(-1.0, 1.0),
            gear_change: self.gear_change.signum(),
        }
    }
}

/// Kinematic state that physics integrates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kinematics {
    pub x: f32,
    /// Height, supplied by the terrain
    pub y: f32,
    pub z: f32,
    /// Where the car points (radians)
    pub orientation: f32,
    /// Where the car travels (radians); lags orientation while sliding
    pub direction: f32,
    /// Signed speed along `direction` (m/s)
    pub speed: f32,
    /// Yaw rate (rad/s)
    pub angular_speed: f32,
}

impl Kinematics {
    fn is_finite(&self) -> bool {
        [
            self.x,
            self.y,
            self.z,
            self.orientation,
            self.direction,
            self.speed,
            self.angular_speed,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    /// Velocity vector on the ground plane
    pub fn velocity(&self) -> (f32, f32) {
        let (dx, dz) = heading_vector(self.direction);
        (dx * self.speed, dz * self.speed)
    }
}

/// Radius of the circle approximating a car in contact checks (m)
pub const CAR_RADIUS: f32 = 1.2;

/// Separation for two touching cars: the second car moves by the returned
/// offset and the first by its negation. `None` when they do not touch.
pub fn contact_push(x1: f32, z1: f32, x2: f32, z2: f32) -> Option<(f32, f32)> {
    let dx = x2 - x1;
    let dz = z2 - z1;
    let dist = (dx * dx + dz * dz).sqrt();
    let combined_radius = 2.0 * CAR_RADIUS;
    if dist >= combined_radius {
        return None;
    }
    if dist < 0.001 {
        // Same position, push apart arbitrarily
        return Some((CAR_RADIUS, 0.0));
    }

    // Half the overlap each, plus a small buffer
    let push = (combined_radius - dist) / 2.0 + 0.05;
    Some((dx / dist * push, dz / dist * push))
}

/// Per-car physics state, owned by one contestant
#[derive(Debug, Clone, PartialEq)]
pub struct CarPhysics {
    spec: CarSpec,
    pub controls: Controls,
    state: Kinematics,
    gear: i8,
    rpm: f32,
    on_track: bool,
    on_floor: bool,
}

impl CarPhysics {
    pub fn new(spec: CarSpec) -> Self {
        Self {
            spec,
            controls: Controls::default(),
            state: Kinematics::default(),
            gear: 0,
            rpm: spec.idle_rpm,
            on_track: true,
            on_floor: true,
        }
    }

    /// Put the car at rest at a position
    pub fn place(&mut self, x: f32, z: f32, heading: f32) {
        self.state = Kinematics {
            x,
            y: self.state.y,
            z,
            orientation: wrap_angle(heading),
            direction: wrap_angle(heading),
            speed: 0.0,
            angular_speed: 0.0,
        };
        self.gear = 0;
        self.rpm = self.spec.idle_rpm;
        self.controls = Controls::default();
    }

    pub fn spec(&self) -> &CarSpec {
        &self.spec
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.state
    }

    /// Overwrite the kinematic state from an authoritative source.
    /// Non-finite values are rejected and the call returns false.
    pub fn set_kinematics(&mut self, state: Kinematics) -> bool {
        if !state.is_finite() {
            return false;
        }
        self.state = Kinematics {
            orientation: wrap_angle(state.orientation),
            direction: wrap_angle(state.direction),
            ..state
        };
        self.rpm = self.rpm_for(self.state.speed, self.gear, 0.0);
        true
    }

    pub fn set_height(&mut self, y: f32) {
        if y.is_finite() {
            self.state.y = y;
        }
    }

    pub fn gear(&self) -> i8 {
        self.gear
    }

    /// Select a gear directly; out-of-range requests clamp
    pub fn set_gear(&mut self, gear: i8) {
        self.gear = gear.clamp(REVERSE_GEAR, CAR_GEARS);
        self.rpm = self.rpm_for(self.state.speed, self.gear, self.controls.accelerator);
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn speed(&self) -> f32 {
        self.state.speed
    }

    pub fn is_on_track(&self) -> bool {
        self.on_track
    }

    pub fn set_on_track(&mut self, on_track: bool) {
        self.on_track = on_track;
    }

    pub fn is_on_floor(&self) -> bool {
        self.on_floor
    }

    pub fn set_on_floor(&mut self, on_floor: bool) {
        self.on_floor = on_floor;
    }

    fn rpm_for(&self, speed: f32, gear: i8, accelerator: f32) -> f32 {
        let spec = &self.spec;
        let rpm = if gear == 0 {
            spec.idle_rpm + accelerator.clamp(0.0, 1.0) * (spec.max_rpm - spec.idle_rpm) * 0.8
        } else {
            spec.idle_rpm + speed.abs() * spec.ratio(gear) * spec.rpm_per_mps
        };
        rpm.clamp(spec.idle_rpm, spec.max_rpm)
    }

    fn apply_gear_change(&mut self) {
        let change = self.controls.gear_change.signum();
        if change != 0 {
            self.set_gear(self.gear + change);
        }
        self.controls.gear_change = 0;
    }

    /// Drive acceleration from the engine, signed along the car's heading
    fn drive_accel(&self, accelerator: f32) -> f32 {
        let spec = &self.spec;
        if self.gear == 0 || accelerator <= 0.0 {
            return 0.0;
        }
        let leverage = spec.ratio(self.gear) / spec.gear_ratios[0];
        let accel = accelerator * spec.max_accel * leverage * spec.torque(self.rpm);
        if self.gear == REVERSE_GEAR {
            -accel
        } else {
            accel
        }
    }

    /// Advance the car by `dt` seconds using the current controls
    pub fn update_physics(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let before = self.state;

        self.apply_gear_change();
        let controls = self.controls.clamped();
        let spec = self.spec;
        let traction = self.on_floor;

        // Longitudinal
        let mut speed = self.state.speed;
        if traction {
            speed += self.drive_accel(controls.accelerator) * dt;
        }
        let mut rolling = spec.rolling;
        if !self.on_track {
            rolling += spec.off_track_rolling;
        }
        let resistance = spec.drag * speed * speed.abs() + rolling * speed;
        let resisted = speed - resistance * dt;
        // Resistance never reverses the direction of travel
        speed = if speed.signum() != resisted.signum() { 0.0 } else { resisted };

        if traction && controls.brakes > 0.0 {
            let dv = controls.brakes * spec.brake_decel * dt;
            speed = if speed > 0.0 {
                (speed - dv).max(0.0)
            } else {
                (speed + dv).min(0.0)
            };
        }

        let top = spec.top_speed(self.gear);
        if self.gear > 0 {
            speed = speed.min(top);
        } else if self.gear == REVERSE_GEAR {
            speed = speed.max(-top);
        }
        if speed.abs() < 0.01 && controls.accelerator == 0.0 {
            speed = 0.0;
        }

        // Steering: authority grows with speed, then fades at high speed
        let target_angular = if traction {
            let fade = speed / spec.steer_fade_speed;
            controls.steering * spec.steer_rate * speed / (1.0 + fade * fade)
        } else {
            0.0
        };
        let response = (spec.steer_response * dt).min(1.0);
        let angular_speed =
            self.state.angular_speed + (target_angular - self.state.angular_speed) * response;
        let orientation = wrap_angle(self.state.orientation + angular_speed * dt);

        // Slip: travel direction follows orientation at a rate limited by grip
        let mut grip_rate = spec.grip_rate;
        if !self.on_track {
            grip_rate *= spec.off_track_grip;
        }
        let lateral_accel = (angular_speed * speed).abs();
        if lateral_accel > spec.lateral_grip {
            grip_rate *= spec.lateral_grip / lateral_accel;
        }
        if !traction {
            grip_rate = 0.0;
        }
        let lag = wrap_angle(orientation - self.state.direction);
        let direction = wrap_angle(self.state.direction + lag * (grip_rate * dt).min(1.0));

        let (dx, dz) = heading_vector(direction);
        let next = Kinematics {
            x: self.state.x + dx * speed * dt,
            y: self.state.y,
            z: self.state.z + dz * speed * dt,
            orientation,
            direction,
            speed,
            angular_speed,
        };

        if next.is_finite() {
            self.state = next;
        } else {
            warn!(?before, "Non-finite car state, holding last position");
            self.state = Kinematics {
                speed: 0.0,
                angular_speed: 0.0,
                ..before
            };
        }
        self.rpm = self.rpm_for(self.state.speed, self.gear, controls.accelerator);
    }
}

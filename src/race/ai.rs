//! AI driving controller
//!
//! Follows the racing line with a speed-dependent lookahead and reacts to
//! nearby cars. Output is the same control demand a human would produce;
//! the drive-assist layer shifts gears for it.

use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::circuit::CircuitData;
use super::contestant::TickContext;
use super::physics::{CarPhysics, Controls, Kinematics, REVERSE_GEAR};
use super::snapshot::WorldSnapshot;
use super::terrain::Terrain;
use crate::util::math::{bearing, closest_approach, distance, right_vector, to_local, wrap_angle};

/// Lookahead distance to the steering target (m, and m per m/s)
const LOOKAHEAD_BASE: f32 = 8.0;
const LOOKAHEAD_PER_MPS: f32 = 0.5;
const MAX_LOOKAHEAD_POINTS: usize = 32;

const STEER_GAIN: f32 = 2.5;

/// Speed band around the target speed where the AI holds part throttle
const SPEED_MARGIN: f32 = 1.0;
/// Deceleration the braking planner assumes (m/s²), below what the car can do
const PLANNING_DECEL: f32 = 9.0;
const MAX_SPEED_SCAN: usize = 64;
/// Heading error (rad) above which the AI brakes regardless of suggested speed
const SHARP_TURN: f32 = 0.8;
const SHARP_TURN_SPEED: f32 = 15.0;
const WALL_MARGIN: f32 = 5.0;

/// Interaction distances (m)
const DETECTION_RANGE: f32 = 40.0;
const OVERTAKE_RANGE: f32 = 20.0;
const BLOCK_RANGE: f32 = 15.0;
const LANE_HALF_WIDTH: f32 = 2.5;
const SIDE_CLEARANCE_LONG: f32 = 8.0;
const SIDE_CLEARANCE_LAT: f32 = 7.0;
const COLLISION_DISTANCE: f32 = 3.5;
/// How far ahead (s) collisions are predicted
const EVADE_HORIZON: f32 = 1.0;
/// Speed difference (m/s) that counts as faster or slower
const CLOSING_SPEED: f32 = 0.5;
/// Lateral offset of the passing line when the circuit has no alternate
const OFFSET_LINE: f32 = 4.0;
const BLOCK_BIAS: f32 = 1.5;
/// Seconds the passing line is kept after the overtake condition clears
const LINE_HOLD: f32 = 1.0;

const STUCK_SPEED: f32 = 1.0;
const STUCK_TIME: f32 = 2.0;
const RECOVERY_TIME: f32 = 1.5;

/// Driver ability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiSkill {
    /// Fraction of suggested speeds the driver targets
    pub pace: f32,
    /// 0..1, scales how hard the driver defends
    pub aggression: f32,
}

impl AiSkill {
    /// Skill for a difficulty in 0..1
    pub fn from_difficulty(difficulty: f32) -> Self {
        let d = if difficulty.is_finite() {
            difficulty.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            pace: 0.8 + 0.2 * d,
            aggression: d,
        }
    }
}

impl Default for AiSkill {
    fn default() -> Self {
        Self::from_difficulty(0.8)
    }
}

/// What the AI is currently doing, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Driving,
    Blocking,
    Overtaking,
    Evading,
}

/// Line the AI aims for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Primary,
    /// Passing line on a side: +1 right, -1 left
    Passing(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Situation {
    Evading { steer: f32, brake: bool },
    Overtaking { side: f32 },
    Blocking { bias: f32 },
    Driving,
}

impl Situation {
    fn behavior(&self) -> Behavior {
        match self {
            Self::Evading { .. } => Behavior::Evading,
            Self::Overtaking { .. } => Behavior::Overtaking,
            Self::Blocking { .. } => Behavior::Blocking,
            Self::Driving => Behavior::Driving,
        }
    }
}

/// Another car in the driver's frame of reference
#[derive(Debug, Clone, Copy)]
struct Nearby {
    longitudinal: f32,
    lateral: f32,
    /// Its speed along our heading
    speed_along: f32,
}

/// Per-driver controller state
#[derive(Debug, Clone, PartialEq)]
pub struct AiDriver {
    skill: AiSkill,
    behavior: Behavior,
    line: Line,
    line_hold: f32,
    stuck_time: f32,
    recovery_time: f32,
}

impl AiDriver {
    pub fn new(skill: AiSkill) -> Self {
        Self {
            skill,
            behavior: Behavior::Driving,
            line: Line::Primary,
            line_hold: 0.0,
            stuck_time: 0.0,
            recovery_time: 0.0,
        }
    }

    pub fn skill(&self) -> &AiSkill {
        &self.skill
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery_time > 0.0
    }

    /// Compute this tick's demand. `point` is the car's tracked racing-line index.
    pub fn drive(
        &mut self,
        car: &mut CarPhysics,
        id: Uuid,
        point: usize,
        ctx: &TickContext<'_>,
    ) -> Controls {
        let circuit = ctx.circuit;
        if !circuit.has_line() {
            self.behavior = Behavior::Driving;
            return Controls {
                accelerator: 1.0,
                ..Controls::default()
            };
        }

        let k = *car.kinematics();
        let dt = ctx.dt.max(0.0);
        let target_idx = target_index(circuit, point, &k);

        let situation = self.classify(&k, id, circuit, target_idx, ctx.terrain, ctx.world);
        self.behavior = situation.behavior();
        self.update_line(&situation, dt);

        let (tx, tz) = match situation {
            Situation::Blocking { bias } => {
                let idx = circuit.next_index(point);
                offset_point(circuit, idx, bias)
            }
            _ => self.line_target(circuit, target_idx),
        };
        let desired = bearing(k.x, k.z, tx, tz).unwrap_or(k.orientation);
        let heading_error = wrap_angle(desired - k.orientation);
        let mut steering = (heading_error * STEER_GAIN).clamp(-1.0, 1.0);

        if self.recovery_time > 0.0 {
            self.recovery_time -= dt;
            if self.recovery_time > 0.0 {
                if car.gear() == 0 {
                    car.set_gear(REVERSE_GEAR);
                }
                // Backing out: steering acts mirrored while rolling backwards
                return Controls {
                    accelerator: 1.0,
                    steering: -steering,
                    ..Controls::default()
                };
            }
            car.set_gear(1);
        }

        let (mut accelerator, mut brakes) = self.pedals(circuit, point, &k);

        if heading_error.abs() > SHARP_TURN && k.speed > SHARP_TURN_SPEED {
            accelerator = 0.0;
            brakes = 1.0;
        }

        if let Some(hit) = ctx.terrain.probe(k.x, k.z, k.orientation) {
            let stopping = k.speed.max(0.0).powi(2) / (2.0 * car.spec().brake_decel) + WALL_MARGIN;
            if hit < stopping {
                accelerator = 0.0;
                brakes = 1.0;
            }
        }

        match situation {
            Situation::Evading { steer, brake } => {
                steering = steer;
                if brake {
                    accelerator = 0.0;
                    brakes = 1.0;
                }
            }
            Situation::Overtaking { .. } => {
                if brakes == 0.0 {
                    accelerator = 1.0;
                }
            }
            Situation::Blocking { .. } | Situation::Driving => {}
        }

        if accelerator > 0.5 && k.speed.abs() < STUCK_SPEED && car.gear() >= 0 {
            self.stuck_time += dt;
            if self.stuck_time >= STUCK_TIME {
                self.stuck_time = 0.0;
                self.recovery_time = RECOVERY_TIME;
                // Neutral first; reverse engages on the next tick
                car.set_gear(0);
                return Controls::default();
            }
        } else {
            self.stuck_time = 0.0;
        }

        Controls {
            accelerator,
            brakes,
            steering,
            gear_change: 0,
        }
    }

    fn classify(
        &self,
        me: &Kinematics,
        id: Uuid,
        circuit: &CircuitData,
        target_idx: usize,
        terrain: &dyn Terrain,
        world: &WorldSnapshot,
    ) -> Situation {
        let (my_vx, my_vz) = me.velocity();
        let my_along = to_local(my_vx, my_vz, me.orientation).0;

        let mut nearby = Vec::new();
        let mut threat: Option<(f32, Nearby, bool)> = None;
        for other in world.others(id) {
            let dx = other.x - me.x;
            let dz = other.z - me.z;
            let range = distance(me.x, me.z, other.x, other.z);
            if range > DETECTION_RANGE {
                continue;
            }
            let (ovx, ovz) = other.velocity();
            let (longitudinal, lateral) = to_local(dx, dz, me.orientation);
            let car = Nearby {
                longitudinal,
                lateral,
                speed_along: to_local(ovx, ovz, me.orientation).0,
            };

            let (rvx, rvz) = (ovx - my_vx, ovz - my_vz);
            let closing = dx * rvx + dz * rvz < 0.0;
            let (t, miss) = closest_approach(dx, dz, rvx, rvz, EVADE_HORIZON);
            if miss < COLLISION_DISTANCE && (closing || range < COLLISION_DISTANCE) {
                if threat.map_or(true, |(best_t, _, _)| t < best_t) {
                    threat = Some((t, car, closing));
                }
            }
            nearby.push(car);
        }

        if let Some((_, car, closing)) = threat {
            let steer = if car.lateral > 0.1 {
                -1.0
            } else if car.lateral < -0.1 {
                1.0
            } else {
                -1.0
            };
            return Situation::Evading {
                steer,
                brake: closing && car.longitudinal > 0.0,
            };
        }

        let ahead = nearby
            .iter()
            .filter(|c| c.longitudinal > 0.0 && c.longitudinal <= OVERTAKE_RANGE)
            .filter(|c| c.lateral.abs() < LANE_HALF_WIDTH)
            .min_by(|a, b| a.longitudinal.total_cmp(&b.longitudinal))
            .copied();

        if let Some(car) = ahead {
            if car.speed_along < my_along - CLOSING_SPEED {
                let preferred = alternate_side(circuit, target_idx)
                    .unwrap_or(if car.lateral > 0.0 { -1.0 } else { 1.0 });
                for side in [preferred, -preferred] {
                    if side_is_clear(side, &car, &nearby, me, terrain) {
                        return Situation::Overtaking { side };
                    }
                }
            }
            return Situation::Driving;
        }

        let behind = nearby
            .iter()
            .filter(|c| c.longitudinal < 0.0 && c.longitudinal >= -BLOCK_RANGE)
            .filter(|c| c.lateral.abs() < 2.0 * LANE_HALF_WIDTH)
            .max_by(|a, b| a.longitudinal.total_cmp(&b.longitudinal))
            .copied();
        if let Some(car) = behind {
            if car.speed_along > my_along + CLOSING_SPEED {
                let bias = car.lateral.signum() * BLOCK_BIAS * self.skill.aggression;
                return Situation::Blocking { bias };
            }
        }

        Situation::Driving
    }

    fn update_line(&mut self, situation: &Situation, dt: f32) {
        match situation {
            Situation::Overtaking { side } => {
                self.line = Line::Passing(*side);
                self.line_hold = LINE_HOLD;
            }
            Situation::Evading { .. } => {}
            _ => {
                if self.line_hold > 0.0 {
                    self.line_hold -= dt;
                } else {
                    self.line = Line::Primary;
                }
            }
        }
    }

    fn line_target(&self, circuit: &CircuitData, idx: usize) -> (f32, f32) {
        let Some(p) = circuit.point(idx) else {
            return (0.0, 0.0);
        };
        match self.line {
            Line::Primary => (p.x, p.z),
            Line::Passing(side) => {
                if let Some((ax, az)) = p.alternate() {
                    if alternate_side(circuit, idx) == Some(side) {
                        return (ax, az);
                    }
                }
                offset_point(circuit, idx, side * OFFSET_LINE)
            }
        }
    }

    /// Throttle and brake from the speed the line allows ahead
    fn pedals(&self, circuit: &CircuitData, point: usize, k: &Kinematics) -> (f32, f32) {
        let Some(limit) = self.speed_limit(circuit, point, k) else {
            return (1.0, 0.0);
        };
        let speed = k.speed;
        if speed < limit - SPEED_MARGIN {
            (1.0, 0.0)
        } else if speed > limit + SPEED_MARGIN {
            (0.0, ((speed - limit) / (4.0 * SPEED_MARGIN)).clamp(0.25, 1.0))
        } else {
            (0.5, 0.0)
        }
    }

    /// Highest speed from which every suggested speed ahead can still be met
    fn speed_limit(&self, circuit: &CircuitData, point: usize, k: &Kinematics) -> Option<f32> {
        let v = k.speed.max(0.0);
        let horizon = v * v / (2.0 * PLANNING_DECEL) + LOOKAHEAD_BASE;

        let mut limit: Option<f32> = None;
        let mut travelled = 0.0;
        let (mut px, mut pz) = (k.x, k.z);
        let mut idx = circuit.next_index(point);
        for _ in 0..MAX_SPEED_SCAN {
            let Some(p) = circuit.point(idx) else {
                break;
            };
            travelled += distance(px, pz, p.x, p.z);
            (px, pz) = (p.x, p.z);
            if let Some(suggested) = p.suggested_speed() {
                let target = suggested * self.skill.pace;
                let room = (travelled - LOOKAHEAD_BASE * 0.5).max(0.0);
                let allowed = (target * target + 2.0 * PLANNING_DECEL * room).sqrt();
                limit = Some(limit.map_or(allowed, |l: f32| l.min(allowed)));
            }
            if travelled > horizon {
                break;
            }
            idx = circuit.next_index(idx);
        }
        limit
    }
}

/// First point ahead of `point` at least the lookahead distance away
fn target_index(circuit: &CircuitData, point: usize, k: &Kinematics) -> usize {
    let lookahead = LOOKAHEAD_BASE + k.speed.abs() * LOOKAHEAD_PER_MPS;
    let mut idx = circuit.next_index(point);
    for _ in 0..MAX_LOOKAHEAD_POINTS {
        match circuit.point(idx) {
            Some(p) if distance(k.x, k.z, p.x, p.z) < lookahead => idx = circuit.next_index(idx),
            _ => break,
        }
    }
    idx
}

/// Side (+1 right, -1 left) the alternate line lies on at `idx`
fn alternate_side(circuit: &CircuitData, idx: usize) -> Option<f32> {
    let p = circuit.point(idx)?;
    let (ax, az) = p.alternate()?;
    let heading = circuit.segment_heading(idx)?;
    let (_, lateral) = to_local(ax - p.x, az - p.z, heading);
    (lateral.abs() > f32::EPSILON).then(|| lateral.signum())
}

/// Racing-line point shifted sideways by `offset` metres (positive to the right)
fn offset_point(circuit: &CircuitData, idx: usize, offset: f32) -> (f32, f32) {
    let Some(p) = circuit.point(idx) else {
        return (0.0, 0.0);
    };
    let heading = circuit.segment_heading(idx).unwrap_or(0.0);
    let (rx, rz) = right_vector(heading);
    (p.x + rx * offset, p.z + rz * offset)
}

/// Whether the passing lane on `side` is free of cars and walls
fn side_is_clear(
    side: f32,
    ahead: &Nearby,
    nearby: &[Nearby],
    me: &Kinematics,
    terrain: &dyn Terrain,
) -> bool {
    let lane_taken = nearby.iter().any(|c| {
        let offset = c.lateral * side;
        offset > LANE_HALF_WIDTH
            && offset < SIDE_CLEARANCE_LAT
            && c.longitudinal > -SIDE_CLEARANCE_LONG
            && c.longitudinal < ahead.longitudinal + SIDE_CLEARANCE_LONG
    });
    if lane_taken {
        return false;
    }
    let sideways = me.orientation + side * FRAC_PI_2;
    !matches!(terrain.probe(me.x, me.z, sideways), Some(d) if d < SIDE_CLEARANCE_LAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::circuit::CircuitPoint;
    use crate::race::contestant::DriverKind;
    use crate::race::physics::{CarClass, CarSpec};
    use crate::race::player::NoInput;
    use crate::race::snapshot::CarSnapshot;
    use crate::race::terrain::OpenGround;
    use std::f32::consts::PI;

    fn straight(speed: f32) -> CircuitData {
        let points = (0..50)
            .map(|i| CircuitPoint::new(i as f32 * 10.0, 0.0).with_speed(speed))
            .collect();
        CircuitData::new("straight", points).unwrap()
    }

    fn car_at(speed: f32) -> CarPhysics {
        let mut car = CarPhysics::new(CarSpec::for_class(CarClass::Sport));
        car.set_gear(3);
        car.set_kinematics(Kinematics {
            speed,
            ..Default::default()
        });
        car
    }

    fn other(x: f32, z: f32, direction: f32, speed: f32) -> CarSnapshot {
        CarSnapshot {
            id: Uuid::new_v4(),
            kind: DriverKind::Ai,
            x,
            z,
            orientation: direction,
            direction,
            speed,
            lap: 1,
            intermediate: 0,
            point: 0,
            finished: false,
        }
    }

    fn drive(
        circuit: &CircuitData,
        car: &mut CarPhysics,
        cars: Vec<CarSnapshot>,
    ) -> (AiDriver, Controls) {
        let world = WorldSnapshot { tick: 0, cars };
        let ctx = TickContext {
            dt: 0.02,
            circuit,
            terrain: &OpenGround,
            input: &NoInput,
            world: &world,
            racing: true,
            race_laps: None,
        };
        let mut ai = AiDriver::new(AiSkill {
            pace: 1.0,
            aggression: 1.0,
        });
        let controls = ai.drive(car, Uuid::nil(), 0, &ctx);
        (ai, controls)
    }

    #[test]
    fn no_line_drives_straight() {
        for circuit in [
            CircuitData::empty("none"),
            CircuitData::new("one", vec![CircuitPoint::new(5.0, 5.0)]).unwrap(),
        ] {
            let mut car = car_at(0.0);
            let (ai, controls) = drive(&circuit, &mut car, vec![]);
            assert_eq!(controls.accelerator, 1.0);
            assert_eq!(controls.steering, 0.0);
            assert_eq!(controls.brakes, 0.0);
            assert_eq!(ai.behavior(), Behavior::Driving);
        }
    }

    #[test]
    fn steers_toward_line() {
        let points = (0..20).map(|i| CircuitPoint::new(i as f32 * 10.0, 20.0)).collect();
        let circuit = CircuitData::new("offset", points).unwrap();
        let mut car = car_at(10.0);
        let (_, controls) = drive(&circuit, &mut car, vec![]);
        assert!(controls.steering > 0.0);
        assert!(controls.steering <= 1.0);
    }

    #[test]
    fn full_throttle_without_suggested_speed() {
        let mut car = car_at(20.0);
        let (_, controls) = drive(&straight(0.0), &mut car, vec![]);
        assert_eq!(controls.accelerator, 1.0);
        assert_eq!(controls.brakes, 0.0);
        assert!(controls.steering.abs() < 1e-4);
    }

    #[test]
    fn brakes_above_suggested_speed() {
        let mut car = car_at(30.0);
        let (_, controls) = drive(&straight(10.0), &mut car, vec![]);
        assert_eq!(controls.accelerator, 0.0);
        assert!(controls.brakes > 0.0);

        let mut slow = car_at(5.0);
        let (_, controls) = drive(&straight(10.0), &mut slow, vec![]);
        assert_eq!(controls.accelerator, 1.0);
    }

    #[test]
    fn brakes_for_sharp_turn_at_speed() {
        let points = (0..20).map(|i| CircuitPoint::new(0.0, -(i as f32) * 10.0 - 10.0)).collect();
        let circuit = CircuitData::new("behind", points).unwrap();
        let mut car = car_at(25.0);
        let (_, controls) = drive(&circuit, &mut car, vec![]);
        assert_eq!(controls.brakes, 1.0);
        assert_eq!(controls.accelerator, 0.0);
    }

    #[test]
    fn overtakes_slower_car_ahead() {
        let mut car = car_at(20.0);
        let (ai, controls) = drive(&straight(0.0), &mut car, vec![other(18.0, 0.0, 0.0, 15.0)]);
        assert_eq!(ai.behavior(), Behavior::Overtaking);
        assert_eq!(ai.line(), Line::Passing(1.0));
        assert!(controls.steering > 0.0);
        assert_eq!(controls.accelerator, 1.0);
    }

    #[test]
    fn uses_other_side_when_one_side_is_taken() {
        let mut car = car_at(20.0);
        let cars = vec![other(18.0, 0.0, 0.0, 15.0), other(10.0, 4.0, 0.0, 20.0)];
        let (ai, _) = drive(&straight(0.0), &mut car, cars);
        assert_eq!(ai.line(), Line::Passing(-1.0));
    }

    #[test]
    fn follows_when_no_gap() {
        let mut car = car_at(20.0);
        let cars = vec![
            other(18.0, 0.0, 0.0, 15.0),
            other(18.0, 4.0, 0.0, 15.0),
            other(18.0, -4.0, 0.0, 15.0),
        ];
        let (ai, _) = drive(&straight(0.0), &mut car, cars);
        assert_eq!(ai.behavior(), Behavior::Driving);
        assert_eq!(ai.line(), Line::Primary);
    }

    #[test]
    fn blocks_faster_car_behind_without_braking() {
        let mut car = car_at(20.0);
        let (ai, controls) = drive(&straight(0.0), &mut car, vec![other(-10.0, 1.0, 0.0, 24.0)]);
        assert_eq!(ai.behavior(), Behavior::Blocking);
        assert_eq!(controls.brakes, 0.0);
        // Covers the attacker's side
        assert!(controls.steering > 0.0);
    }

    #[test]
    fn evading_wins_over_overtaking() {
        let mut car = car_at(20.0);
        let (ai, controls) = drive(&straight(0.0), &mut car, vec![other(15.0, 0.0, PI, 20.0)]);
        assert_eq!(ai.behavior(), Behavior::Evading);
        assert_eq!(controls.brakes, 1.0);
        assert_eq!(controls.accelerator, 0.0);
        assert_eq!(controls.steering.abs(), 1.0);
    }

    #[test]
    fn far_cars_are_ignored() {
        let mut car = car_at(20.0);
        let (ai, _) = drive(&straight(0.0), &mut car, vec![other(100.0, 0.0, 0.0, 5.0)]);
        assert_eq!(ai.behavior(), Behavior::Driving);
    }

    #[test]
    fn stuck_car_backs_out() {
        let mut car = car_at(0.0);
        let circuit = straight(0.0);
        let world = WorldSnapshot::default();
        let ctx = TickContext {
            dt: 0.1,
            circuit: &circuit,
            terrain: &OpenGround,
            input: &NoInput,
            world: &world,
            racing: true,
            race_laps: None,
        };
        let mut ai = AiDriver::new(AiSkill::default());
        // The car never moves because physics is not run
        for _ in 0..25 {
            ai.drive(&mut car, Uuid::nil(), 0, &ctx);
        }
        assert!(ai.is_recovering());
        assert_eq!(car.gear(), REVERSE_GEAR);

        for _ in 0..20 {
            ai.drive(&mut car, Uuid::nil(), 0, &ctx);
        }
        assert!(!ai.is_recovering());
        assert_eq!(car.gear(), 1);
    }

    #[test]
    fn stuck_recovery_passes_through_neutral() {
        let mut car = car_at(0.0);
        car.set_gear(1);
        let circuit = straight(0.0);
        let world = WorldSnapshot::default();
        let ctx = TickContext {
            dt: 0.1,
            circuit: &circuit,
            terrain: &OpenGround,
            input: &NoInput,
            world: &world,
            racing: true,
            race_laps: None,
        };
        let mut ai = AiDriver::new(AiSkill::default());
        let mut ticks = 0;
        while !ai.is_recovering() {
            ai.drive(&mut car, Uuid::nil(), 0, &ctx);
            ticks += 1;
            assert!(ticks < 100, "never detected as stuck");
        }
        assert_eq!(car.gear(), 0);

        ai.drive(&mut car, Uuid::nil(), 0, &ctx);
        assert_eq!(car.gear(), REVERSE_GEAR);
    }
}

//! Human player controls: key bindings and input sampling

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::physics::Controls;
use crate::util::math::approach;

/// Number of keys in a control set
pub const CONTROL_SET_KEYS: usize = 6;

/// Steering travel per second when a steer key is held or released
const STEER_RAMP: f32 = 4.0;

/// Opaque key code as reported by the input layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(pub u32);

/// Key binding errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("Control set needs {expected} keys, got {found}")]
    WrongLength { found: usize, expected: usize },

    #[error("No control set at index {0}")]
    UnknownSet(usize),
}

/// Keys bound to each driving action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSet {
    pub accelerate: KeyCode,
    pub brake: KeyCode,
    pub steer_left: KeyCode,
    pub steer_right: KeyCode,
    pub gear_up: KeyCode,
    pub gear_down: KeyCode,
}

impl ControlSet {
    /// Build from keys in the order accelerate, brake, left, right, gear up, gear down
    pub fn from_keys(keys: &[KeyCode]) -> Result<Self, BindingError> {
        match *keys {
            [accelerate, brake, steer_left, steer_right, gear_up, gear_down] => Ok(Self {
                accelerate,
                brake,
                steer_left,
                steer_right,
                gear_up,
                gear_down,
            }),
            _ => Err(BindingError::WrongLength {
                found: keys.len(),
                expected: CONTROL_SET_KEYS,
            }),
        }
    }

    pub fn keys(&self) -> [KeyCode; CONTROL_SET_KEYS] {
        [
            self.accelerate,
            self.brake,
            self.steer_left,
            self.steer_right,
            self.gear_up,
            self.gear_down,
        ]
    }

    /// Arrow keys with A/Z for gears
    pub fn arrows() -> Self {
        Self {
            accelerate: KeyCode(38),
            brake: KeyCode(40),
            steer_left: KeyCode(37),
            steer_right: KeyCode(39),
            gear_up: KeyCode(65),
            gear_down: KeyCode(90),
        }
    }

    /// WASD with Q/E for gears
    pub fn wasd() -> Self {
        Self {
            accelerate: KeyCode(87),
            brake: KeyCode(83),
            steer_left: KeyCode(65),
            steer_right: KeyCode(68),
            gear_up: KeyCode(69),
            gear_down: KeyCode(81),
        }
    }
}

/// Pick binding set `index` out of configured key lists
pub fn select_control_set(sets: &[Vec<KeyCode>], index: usize) -> Result<ControlSet, BindingError> {
    let keys = sets.get(index).ok_or(BindingError::UnknownSet(index))?;
    ControlSet::from_keys(keys)
}

/// Keyboard state as seen by the simulation for one tick
pub trait InputSource {
    fn is_pressed(&self, key: KeyCode) -> bool;
    /// Whether the key went up during this tick
    fn was_released(&self, key: KeyCode) -> bool;
}

/// No keys ever pressed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn is_pressed(&self, _key: KeyCode) -> bool {
        false
    }

    fn was_released(&self, _key: KeyCode) -> bool {
        false
    }
}

/// Key state fed by press/release events from the input layer
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pressed: HashSet<KeyCode>,
    released: HashSet<KeyCode>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: KeyCode) {
        self.pressed.insert(key);
    }

    pub fn release(&mut self, key: KeyCode) {
        if self.pressed.remove(&key) {
            self.released.insert(key);
        }
    }

    /// Forget this tick's releases; call after every simulation tick
    pub fn end_tick(&mut self) {
        self.released.clear();
    }
}

impl InputSource for KeyState {
    fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    fn was_released(&self, key: KeyCode) -> bool {
        self.released.contains(&key)
    }
}

/// Per-player control state
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDriver {
    bindings: ControlSet,
    steering: f32,
}

impl PlayerDriver {
    pub fn new(bindings: ControlSet) -> Self {
        Self {
            bindings,
            steering: 0.0,
        }
    }

    pub fn bindings(&self) -> &ControlSet {
        &self.bindings
    }

    /// Sample the bound keys into a raw demand. Steering ramps toward the
    /// held direction; gear keys act once, when released.
    pub fn read_controls(&mut self, input: &dyn InputSource, dt: f32) -> Controls {
        let keys = &self.bindings;
        let held = |key| if input.is_pressed(key) { 1.0 } else { 0.0 };

        let target = held(keys.steer_right) - held(keys.steer_left);
        self.steering = approach(self.steering, target, STEER_RAMP * dt.max(0.0));

        let released = (
            input.was_released(keys.gear_up),
            input.was_released(keys.gear_down),
        );
        let gear_change = match released {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        };

        Controls {
            accelerator: held(keys.accelerate),
            brakes: held(keys.brake),
            steering: self.steering,
            gear_change,
        }
    }

    /// Controls while the car is not allowed to race; steering still tracks the keys
    pub fn idle_controls(&mut self, input: &dyn InputSource, dt: f32) -> Controls {
        Controls {
            accelerator: 0.0,
            brakes: 0.0,
            gear_change: 0,
            ..self.read_controls(input, dt)
        }
    }
}

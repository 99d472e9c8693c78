//! Collision and surface queries against track geometry
//!
//! The real geometry lives in the rendering layer; the simulation only asks
//! these questions through the `Terrain` trait.

use std::sync::Arc;

use super::circuit::CircuitData;
use crate::util::math::heading_vector;

/// Surface under a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ground {
    /// Floor height, `None` when there is no floor (car is airborne or fell off)
    pub height: Option<f32>,
    /// Whether the surface counts as racing track
    pub on_track: bool,
}

impl Ground {
    pub fn track(height: f32) -> Self {
        Self {
            height: Some(height),
            on_track: true,
        }
    }

    pub fn off_track(height: f32) -> Self {
        Self {
            height: Some(height),
            on_track: false,
        }
    }

    pub fn on_floor(&self) -> bool {
        self.height.is_some()
    }
}

/// Pure queries against track geometry
pub trait Terrain: Send + Sync {
    /// Distance along `heading` from (x, z) to the nearest obstacle, or `None` for no hit
    fn probe(&self, x: f32, z: f32, heading: f32) -> Option<f32>;

    /// Surface under (x, z)
    fn ground(&self, _x: f32, _z: f32) -> Ground {
        Ground::track(0.0)
    }
}

/// Flat ground that counts as track everywhere and has no obstacles
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGround;

impl Terrain for OpenGround {
    fn probe(&self, _x: f32, _z: f32, _heading: f32) -> Option<f32> {
        None
    }
}

/// Track is a corridor of fixed half-width around the racing line; beyond
/// `wall_distance` from the line there is a wall.
#[derive(Debug, Clone)]
pub struct CorridorTerrain {
    circuit: Arc<CircuitData>,
    half_width: f32,
    wall_distance: Option<f32>,
    probe_range: f32,
    probe_step: f32,
}

impl CorridorTerrain {
    pub fn new(circuit: Arc<CircuitData>, half_width: f32) -> Self {
        Self {
            circuit,
            half_width,
            wall_distance: None,
            probe_range: 60.0,
            probe_step: 1.0,
        }
    }

    pub fn with_walls(mut self, wall_distance: f32) -> Self {
        self.wall_distance = Some(wall_distance);
        self
    }

    fn line_distance(&self, x: f32, z: f32) -> f32 {
        self.circuit.distance_to_line(x, z).unwrap_or(0.0)
    }
}

impl Terrain for CorridorTerrain {
    fn probe(&self, x: f32, z: f32, heading: f32) -> Option<f32> {
        let wall = self.wall_distance?;
        let (fx, fz) = heading_vector(heading);
        let mut travelled = self.probe_step;
        while travelled <= self.probe_range {
            if self.line_distance(x + fx * travelled, z + fz * travelled) >= wall {
                return Some(travelled);
            }
            travelled += self.probe_step;
        }
        None
    }

    fn ground(&self, x: f32, z: f32) -> Ground {
        if self.line_distance(x, z) <= self.half_width {
            Ground::track(0.0)
        } else {
            Ground::off_track(0.0)
        }
    }
}

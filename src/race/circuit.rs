//! Circuit description: racing line, alternate line, sector markers and grid

use std::f32::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::laptime::SECTOR_COUNT;
use crate::util::math::{bearing, distance_to_segment, heading_vector, right_vector};

/// Alternate points closer to the origin than this are treated as unset
pub const ALT_THRESHOLD: f32 = 0.01;

/// Suggested speeds at or below this are treated as unset
pub const SPEED_THRESHOLD: f32 = 0.1;

/// Spacing of generated grid slots behind the start point (meters)
const GRID_ROW_SPACING: f32 = 6.0;
const GRID_FIRST_ROW: f32 = 8.0;
const GRID_COLUMN_OFFSET: f32 = 3.0;

/// One point of the racing line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitPoint {
    pub x: f32,
    pub z: f32,
    /// Alternate line position, zero when the point has none
    #[serde(default)]
    pub alt_x: f32,
    #[serde(default)]
    pub alt_z: f32,
    /// Suggested speed in m/s, zero when the point has none
    #[serde(default)]
    pub speed: f32,
    /// Sector boundary marker
    #[serde(default)]
    pub intermediate: bool,
}

impl CircuitPoint {
    pub fn new(x: f32, z: f32) -> Self {
        Self {
            x,
            z,
            alt_x: 0.0,
            alt_z: 0.0,
            speed: 0.0,
            intermediate: false,
        }
    }

    pub fn with_alternate(mut self, alt_x: f32, alt_z: f32) -> Self {
        self.alt_x = alt_x;
        self.alt_z = alt_z;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn marked(mut self) -> Self {
        self.intermediate = true;
        self
    }

    pub fn alternate(&self) -> Option<(f32, f32)> {
        let magnitude = (self.alt_x * self.alt_x + self.alt_z * self.alt_z).sqrt();
        (magnitude > ALT_THRESHOLD).then_some((self.alt_x, self.alt_z))
    }

    pub fn suggested_speed(&self) -> Option<f32> {
        (self.speed > SPEED_THRESHOLD).then_some(self.speed)
    }
}

/// Starting grid slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSlot {
    pub x: f32,
    pub z: f32,
    pub heading: f32,
}

/// Fixed camera anchor; carried for the renderer, unused by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraAnchor {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Circuit file contents
#[derive(Debug, Deserialize)]
struct CircuitFile {
    name: String,
    points: Vec<CircuitPoint>,
    #[serde(default)]
    grid: Vec<GridSlot>,
    #[serde(default)]
    cameras: Vec<CameraAnchor>,
}

/// Circuit validation errors
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("Circuit has {found} intermediate markers, expected 0 or {expected}")]
    IntermediateCount { found: usize, expected: usize },

    #[error("Circuit point {0} has non-finite coordinates")]
    NonFinitePoint(usize),

    #[error("Invalid circuit JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read circuit file: {0}")]
    Io(#[from] std::io::Error),
}

/// Racing line and layout of a circuit. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitData {
    name: String,
    points: Vec<CircuitPoint>,
    markers: Vec<usize>,
    grid: Vec<GridSlot>,
    cameras: Vec<CameraAnchor>,
}

impl CircuitData {
    /// Build a circuit from points ordered along the direction of travel
    pub fn new(name: impl Into<String>, points: Vec<CircuitPoint>) -> Result<Self, CircuitError> {
        for (i, p) in points.iter().enumerate() {
            let values = [p.x, p.z, p.alt_x, p.alt_z, p.speed];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CircuitError::NonFinitePoint(i));
            }
        }

        let markers: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.intermediate)
            .map(|(i, _)| i)
            .collect();
        if !markers.is_empty() && markers.len() != SECTOR_COUNT {
            return Err(CircuitError::IntermediateCount {
                found: markers.len(),
                expected: SECTOR_COUNT,
            });
        }

        Ok(Self {
            name: name.into(),
            points,
            markers,
            grid: Vec::new(),
            cameras: Vec::new(),
        })
    }

    /// A circuit with no racing line
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
            markers: Vec::new(),
            grid: Vec::new(),
            cameras: Vec::new(),
        }
    }

    pub fn with_grid(mut self, grid: Vec<GridSlot>) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_cameras(mut self, cameras: Vec<CameraAnchor>) -> Self {
        self.cameras = cameras;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, CircuitError> {
        let file: CircuitFile = serde_json::from_str(json)?;
        Ok(Self::new(file.name, file.points)?
            .with_grid(file.grid)
            .with_cameras(file.cameras))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CircuitError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Generate a stadium-shaped circuit: two straights joined by semicircles,
    /// travelled counter-clockwise, with three evenly spaced sector markers.
    pub fn stadium(
        name: impl Into<String>,
        straight: f32,
        radius: f32,
        point_count: usize,
        alt_offset: f32,
        corner_grip: f32,
    ) -> Result<Self, CircuitError> {
        let count = point_count.max(SECTOR_COUNT);
        let turn = PI * radius;
        let perimeter = 2.0 * straight + 2.0 * turn;
        let corner_speed = (corner_grip * radius).sqrt();
        let half = straight / 2.0;

        let mut points = Vec::with_capacity(count);
        for i in 0..count {
            let s = perimeter * i as f32 / count as f32;
            let (x, z, heading, cornering) = if s < straight {
                (-half + s, -radius, 0.0, false)
            } else if s < straight + turn {
                let theta = -PI / 2.0 + (s - straight) / radius;
                (half + radius * theta.cos(), radius * theta.sin(), theta + PI / 2.0, true)
            } else if s < 2.0 * straight + turn {
                (half - (s - straight - turn), radius, PI, false)
            } else {
                let theta = PI / 2.0 + (s - 2.0 * straight - turn) / radius;
                (-half + radius * theta.cos(), radius * theta.sin(), theta + PI / 2.0, true)
            };

            // Travel is toward the right, so the alternate line runs on the left, outside the oval
            let (rx, rz) = right_vector(heading);
            let mut point = CircuitPoint::new(x, z)
                .with_alternate(x - rx * alt_offset, z - rz * alt_offset);
            if cornering {
                point = point.with_speed(corner_speed);
            }
            if i % (count / SECTOR_COUNT) == 0 && i / (count / SECTOR_COUNT) < SECTOR_COUNT {
                point = point.marked();
            }
            points.push(point);
        }

        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[CircuitPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether there is a line to follow at all
    pub fn has_line(&self) -> bool {
        self.points.len() >= 2
    }

    /// Point at an index, wrapping past the last point
    pub fn point(&self, index: usize) -> Option<&CircuitPoint> {
        if self.points.is_empty() {
            return None;
        }
        self.points.get(index % self.points.len())
    }

    pub fn next_index(&self, index: usize) -> usize {
        if self.points.is_empty() {
            0
        } else {
            (index + 1) % self.points.len()
        }
    }

    /// Point indices of the sector markers, in travel order
    pub fn markers(&self) -> &[usize] {
        &self.markers
    }

    pub fn intermediate_count(&self) -> usize {
        self.markers.len()
    }

    /// Which sector marker sits at `point`, if any
    pub fn marker_at(&self, point: usize) -> Option<usize> {
        self.markers.iter().position(|&m| m == point)
    }

    /// Point where laps start: the first marker, or point 0
    pub fn start_point(&self) -> usize {
        self.markers.first().copied().unwrap_or(0)
    }

    /// Heading of the segment leaving `index`, or `None` for degenerate segments
    pub fn segment_heading(&self, index: usize) -> Option<f32> {
        if !self.has_line() {
            return None;
        }
        let a = self.point(index)?;
        let b = self.point(self.next_index(index))?;
        bearing(a.x, a.z, b.x, b.z)
    }

    /// Grid slot for a starting position, generated behind the start point when
    /// the circuit does not define enough slots
    pub fn grid_slot(&self, position: usize) -> GridSlot {
        if let Some(slot) = self.grid.get(position) {
            return *slot;
        }

        let start = self.start_point();
        let (x, z) = self
            .point(start)
            .map(|p| (p.x, p.z))
            .unwrap_or((0.0, 0.0));
        let heading = self.segment_heading(start).unwrap_or(0.0);
        let (fx, fz) = heading_vector(heading);
        let (rx, rz) = right_vector(heading);

        let back = GRID_FIRST_ROW + position as f32 * GRID_ROW_SPACING;
        let side = if position % 2 == 0 {
            GRID_COLUMN_OFFSET
        } else {
            -GRID_COLUMN_OFFSET
        };
        GridSlot {
            x: x - fx * back + rx * side,
            z: z - fz * back + rz * side,
            heading,
        }
    }

    pub fn cameras(&self) -> &[CameraAnchor] {
        &self.cameras
    }

    /// Distance from a position to the closest segment of the racing line
    pub fn distance_to_line(&self, x: f32, z: f32) -> Option<f32> {
        match self.points.len() {
            0 => None,
            1 => {
                let p = &self.points[0];
                Some(crate::util::math::distance(x, z, p.x, p.z))
            }
            n => (0..n)
                .map(|i| {
                    let a = &self.points[i];
                    let b = &self.points[(i + 1) % n];
                    distance_to_segment(x, z, a.x, a.z, b.x, b.z)
                })
                .reduce(f32::min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stadium() -> CircuitData {
        CircuitData::stadium("test", 200.0, 50.0, 120, 4.0, 9.0).unwrap()
    }

    #[test]
    fn stadium_has_three_markers_starting_at_zero() {
        let circuit = test_stadium();
        assert_eq!(circuit.len(), 120);
        assert_eq!(circuit.markers(), &[0, 40, 80]);
        assert_eq!(circuit.start_point(), 0);
    }

    #[test]
    fn stadium_corners_carry_suggested_speed() {
        let circuit = test_stadium();
        let first = circuit.point(0).unwrap();
        assert!(first.suggested_speed().is_none());
        let cornering = circuit
            .points()
            .iter()
            .filter(|p| p.suggested_speed().is_some())
            .count();
        assert!(cornering > 0 && cornering < circuit.len());
    }

    #[test]
    fn near_zero_alternate_and_speed_are_unset() {
        let p = CircuitPoint::new(5.0, 5.0).with_alternate(0.001, -0.001).with_speed(0.05);
        assert!(p.alternate().is_none());
        assert!(p.suggested_speed().is_none());

        let q = CircuitPoint::new(5.0, 5.0).with_alternate(7.0, 5.0).with_speed(30.0);
        assert_eq!(q.alternate(), Some((7.0, 5.0)));
        assert_eq!(q.suggested_speed(), Some(30.0));
    }

    #[test]
    fn wrong_marker_count_is_rejected() {
        let points = vec![
            CircuitPoint::new(0.0, 0.0).marked(),
            CircuitPoint::new(10.0, 0.0).marked(),
            CircuitPoint::new(20.0, 0.0),
        ];
        let err = CircuitData::new("bad", points).unwrap_err();
        assert!(matches!(err, CircuitError::IntermediateCount { found: 2, .. }));
    }

    #[test]
    fn non_finite_point_is_rejected() {
        let points = vec![CircuitPoint::new(0.0, f32::NAN)];
        assert!(matches!(
            CircuitData::new("nan", points),
            Err(CircuitError::NonFinitePoint(0))
        ));
    }

    #[test]
    fn indices_wrap_around() {
        let circuit = test_stadium();
        assert_eq!(circuit.next_index(119), 0);
        assert_eq!(circuit.point(121), circuit.point(1));
        assert_eq!(circuit.marker_at(40), Some(1));
        assert_eq!(circuit.marker_at(41), None);
    }

    #[test]
    fn generated_grid_sits_behind_start_line() {
        let circuit = test_stadium();
        let start = circuit.point(0).unwrap();
        let pole = circuit.grid_slot(0);
        let second = circuit.grid_slot(1);
        // Travel starts along +x, so the grid is at smaller x
        assert!(pole.x < start.x);
        assert!(second.x < pole.x);
        assert!((pole.z - second.z).abs() > 1.0);
    }

    #[test]
    fn parses_json_circuit() {
        let json = r#"{
            "name": "mini",
            "points": [
                {"x": 0.0, "z": 0.0, "intermediate": true},
                {"x": 50.0, "z": 0.0, "speed": 20.0},
                {"x": 50.0, "z": 50.0, "intermediate": true},
                {"x": 0.0, "z": 50.0, "alt_x": 0.0, "alt_z": 55.0, "intermediate": true}
            ],
            "grid": [{"x": -5.0, "z": 0.0, "heading": 0.0}]
        }"#;
        let circuit = CircuitData::from_json(json).unwrap();
        assert_eq!(circuit.name(), "mini");
        assert_eq!(circuit.intermediate_count(), 3);
        assert_eq!(circuit.point(3).unwrap().alternate(), Some((0.0, 55.0)));
        assert_eq!(circuit.grid_slot(0).x, -5.0);
    }

    #[test]
    fn distance_to_line_of_empty_circuit_is_none() {
        assert!(CircuitData::empty("none").distance_to_line(0.0, 0.0).is_none());
        let circuit = test_stadium();
        let d = circuit.distance_to_line(0.0, -50.0).unwrap();
        assert!(d < 0.5);
    }
}

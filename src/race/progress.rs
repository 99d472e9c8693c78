//! Lap, sector and racing-line progress of one contestant

use super::circuit::CircuitData;
use super::laptime::{LapTime, Millis, SECTOR_COUNT};
use crate::util::math::distance;
use crate::util::time::secs_to_millis;

/// Most racing-line points a car may pass in one tick
const MAX_POINT_STEPS: usize = 16;

/// What happened to lap bookkeeping during one update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LapEvents {
    /// Sector closed this update, with its time
    pub sector: Option<(usize, Millis)>,
    /// Lap closed this update
    pub lap_completed: Option<LapTime>,
    /// The closed lap is this contestant's new best
    pub new_best: bool,
}

/// Lap counter, last passed marker and point, and the lap history.
///
/// `laps[n - 1]` holds lap `n`; the last entry is always the lap in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct LapProgress {
    lap: u32,
    intermediate: usize,
    point: usize,
    laps: Vec<LapTime>,
    best: Option<usize>,
    /// Seconds since the current lap started
    lap_elapsed: f64,
    /// Lap-relative second at which the current sector started
    sector_start: f64,
}

impl LapProgress {
    pub fn new(start_point: usize) -> Self {
        Self {
            lap: 1,
            intermediate: 0,
            point: start_point,
            laps: vec![LapTime::new()],
            best: None,
            lap_elapsed: 0.0,
            sector_start: 0.0,
        }
    }

    pub fn lap(&self) -> u32 {
        self.lap
    }

    pub fn intermediate(&self) -> usize {
        self.intermediate
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn laps(&self) -> &[LapTime] {
        &self.laps
    }

    /// Lap `n` (1-based)
    pub fn lap_time(&self, lap: u32) -> Option<&LapTime> {
        (lap as usize).checked_sub(1).and_then(|i| self.laps.get(i))
    }

    pub fn best(&self) -> Option<&LapTime> {
        self.best.and_then(|i| self.laps.get(i))
    }

    /// Most recently completed lap
    pub fn last_completed(&self) -> Option<&LapTime> {
        self.laps.iter().rev().find(|l| l.is_complete())
    }

    pub fn lap_elapsed_millis(&self) -> Millis {
        secs_to_millis(self.lap_elapsed)
    }

    /// Points passed since the start point, for ordering within a lap
    pub fn points_since_start(&self, circuit: &CircuitData) -> usize {
        let n = circuit.len();
        if n == 0 {
            return 0;
        }
        (self.point % n + n - circuit.start_point() % n) % n
    }

    /// Advance the lap clock and follow the car along the racing line
    pub fn update(&mut self, dt: f32, x: f32, z: f32, circuit: &CircuitData) -> LapEvents {
        let mut events = LapEvents::default();
        if dt.is_finite() && dt > 0.0 {
            self.lap_elapsed += dt as f64;
        }
        if !circuit.has_line() {
            return events;
        }

        for _ in 0..MAX_POINT_STEPS {
            let next = circuit.next_index(self.point);
            let (Some(current_p), Some(next_p)) = (circuit.point(self.point), circuit.point(next))
            else {
                break;
            };
            if distance(x, z, next_p.x, next_p.z) >= distance(x, z, current_p.x, current_p.z) {
                break;
            }
            self.point = next;
            if circuit.intermediate_count() == 0 {
                // Without markers the lap closes on crossing point 0, as one sector
                if next == circuit.start_point() {
                    self.close_whole_lap(&mut events);
                }
            } else if let Some(marker) = circuit.marker_at(next) {
                self.pass_marker(marker, &mut events);
            }
        }
        events
    }

    fn pass_marker(&mut self, marker: usize, events: &mut LapEvents) {
        // Markers only count in order; a skipped one means the car cut the track
        if marker != (self.intermediate + 1) % SECTOR_COUNT {
            return;
        }

        let sector_time = secs_to_millis(self.lap_elapsed - self.sector_start);
        let closing = self.intermediate;
        if let Some(current) = self.laps.last_mut() {
            current.set_sector(closing, sector_time);
        }
        events.sector = Some((closing, sector_time));
        self.sector_start = self.lap_elapsed;
        self.intermediate = marker;

        if marker == 0 {
            let completed = self.close_lap(None);
            events.new_best = self.best == Some(self.laps.len() - 2);
            events.lap_completed = completed;
        }
    }

    fn close_whole_lap(&mut self, events: &mut LapEvents) {
        let lap_time = self.lap_elapsed_millis();
        let completed = self.close_lap(Some(lap_time));
        events.new_best = self.best == Some(self.laps.len() - 2);
        events.lap_completed = completed;
    }

    /// Close the lap in progress, optionally with an explicit total, and open
    /// the next one. Returns the closed lap.
    pub fn close_lap(&mut self, total: Option<Millis>) -> Option<LapTime> {
        let index = self.laps.len() - 1;
        let closed = {
            let current = &mut self.laps[index];
            if let Some(total) = total {
                current.set_total(total);
            }
            current.set_complete();
            *current
        };

        let is_best = match self.best() {
            Some(best) => closed.laptime() < best.laptime(),
            None => closed.is_set(),
        };
        if is_best {
            self.best = Some(index);
        }

        self.laps.push(LapTime::new());
        self.lap += 1;
        self.lap_elapsed = 0.0;
        self.sector_start = 0.0;
        Some(closed)
    }

    /// Overwrite position along the line from an authoritative source.
    /// The lap counter never moves backwards; closed laps are never reopened.
    /// Points past the end of the line wrap onto it.
    pub fn overwrite(
        &mut self,
        lap: u32,
        intermediate: usize,
        point: usize,
        elapsed: Millis,
        circuit: &CircuitData,
    ) -> bool {
        if lap < self.lap {
            return false;
        }
        self.intermediate = intermediate % SECTOR_COUNT;
        self.point = match circuit.len() {
            0 => 0,
            n => point % n,
        };
        self.lap_elapsed = elapsed as f64 / 1000.0;
        self.sector_start = self.sector_start.min(self.lap_elapsed);
        true
    }
}

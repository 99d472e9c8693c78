//! Lap timing with per-sector splits

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds
pub type Millis = u32;

/// Sentinel for a time that has not been recorded
pub const TIME_NOT_SET: Millis = 300_000;

/// Number of timed sectors per lap
pub const SECTOR_COUNT: usize = 3;

/// Times for a single lap.
///
/// Sectors are filled as the car crosses intermediate markers. The total is
/// either derived from the sectors once the lap is complete, or set
/// explicitly when a remote peer reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LapTime {
    sectors: [Millis; SECTOR_COUNT],
    total: Option<Millis>,
    complete: bool,
}

impl LapTime {
    pub fn new() -> Self {
        Self {
            sectors: [TIME_NOT_SET; SECTOR_COUNT],
            total: None,
            complete: false,
        }
    }

    /// Build a completed lap from its three sector times
    pub fn from_sectors(sectors: [Millis; SECTOR_COUNT]) -> Self {
        Self {
            sectors,
            total: None,
            complete: true,
        }
    }

    /// Build a completed lap known only by its total
    pub fn from_total(total: Millis) -> Self {
        Self {
            sectors: [TIME_NOT_SET; SECTOR_COUNT],
            total: Some(total),
            complete: true,
        }
    }

    /// Record a sector time. Out-of-range sectors are ignored, a frozen lap is not changed.
    pub fn set_sector(&mut self, sector: usize, time: Millis) {
        if self.complete {
            return;
        }
        if let Some(slot) = self.sectors.get_mut(sector) {
            *slot = time;
        }
    }

    pub fn sector(&self, sector: usize) -> Option<Millis> {
        self.sectors
            .get(sector)
            .copied()
            .filter(|&t| t != TIME_NOT_SET)
    }

    /// Set the total directly, overriding the sector sum
    pub fn set_total(&mut self, total: Millis) {
        if !self.complete {
            self.total = Some(total);
        }
    }

    /// Freeze the lap
    pub fn set_complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Total lap time, or `TIME_NOT_SET` while the lap is still running
    pub fn laptime(&self) -> Millis {
        if !self.complete {
            return TIME_NOT_SET;
        }
        if let Some(total) = self.total {
            return total;
        }
        let set: Vec<Millis> = self
            .sectors
            .iter()
            .copied()
            .filter(|&t| t != TIME_NOT_SET)
            .collect();
        if set.is_empty() {
            return TIME_NOT_SET;
        }
        set.iter().fold(0u32, |acc, &t| acc.saturating_add(t))
    }

    /// Whether this lap holds a usable time
    pub fn is_set(&self) -> bool {
        self.laptime() != TIME_NOT_SET
    }
}

impl Default for LapTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Ord for LapTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.laptime()
            .cmp(&other.laptime())
            .then_with(|| self.sectors.cmp(&other.sectors))
            .then_with(|| self.total.cmp(&other.total))
            .then_with(|| self.complete.cmp(&other.complete))
    }
}

impl PartialOrd for LapTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Format milliseconds as `m:ss.mmm`, or `-:--.---` for the sentinel
pub fn format_millis(time: Millis) -> String {
    if time >= TIME_NOT_SET {
        return "-:--.---".to_string();
    }
    let minutes = time / 60_000;
    let seconds = (time % 60_000) / 1000;
    let millis = time % 1000;
    format!("{}:{:02}.{:03}", minutes, seconds, millis)
}

impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_millis(self.laptime()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laptime_sums_sectors_once_complete() {
        let mut lap = LapTime::new();
        lap.set_sector(0, 10_000);
        lap.set_sector(1, 20_000);
        lap.set_sector(2, 30_000);
        assert_eq!(lap.laptime(), TIME_NOT_SET);

        lap.set_complete();
        assert_eq!(lap.laptime(), 60_000);
    }

    #[test]
    fn partial_sectors_sum_only_what_is_set() {
        let mut lap = LapTime::new();
        lap.set_sector(1, 25_000);
        lap.set_complete();
        assert_eq!(lap.laptime(), 25_000);
    }

    #[test]
    fn completed_lap_is_frozen() {
        let mut lap = LapTime::from_sectors([1_000, 2_000, 3_000]);
        lap.set_sector(0, 9_999);
        lap.set_total(1);
        assert_eq!(lap.laptime(), 6_000);
    }

    #[test]
    fn explicit_total_wins_over_sectors() {
        let mut lap = LapTime::new();
        lap.set_sector(0, 10_000);
        lap.set_total(45_500);
        lap.set_complete();
        assert_eq!(lap.laptime(), 45_500);
    }

    #[test]
    fn ordering_is_antisymmetric_and_follows_total() {
        let fast = LapTime::from_total(60_000);
        let slow = LapTime::from_total(61_000);
        assert_eq!(fast.cmp(&slow), slow.cmp(&fast).reverse());

        let mut laps = vec![slow, fast];
        laps.sort();
        let totals: Vec<Millis> = laps.iter().map(LapTime::laptime).collect();
        assert_eq!(totals, vec![60_000, 61_000]);
    }

    #[test]
    fn unset_lap_sorts_last() {
        let mut laps = vec![LapTime::new(), LapTime::from_total(90_000)];
        laps.sort();
        assert_eq!(laps[0].laptime(), 90_000);
        assert!(!laps[1].is_set());
    }

    #[test]
    fn formats_minutes_seconds_millis() {
        assert_eq!(format_millis(83_456), "1:23.456");
        assert_eq!(format_millis(TIME_NOT_SET), "-:--.---");
        assert_eq!(LapTime::from_total(5_007).to_string(), "0:05.007");
    }
}

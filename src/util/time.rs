//! Time utilities for the race simulation

use std::time::Instant;

/// Host start time for uptime tracking
static HOST_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize host start time (call once at startup)
pub fn init_host_time() {
    HOST_START.get_or_init(Instant::now);
}

/// Get host uptime in seconds
pub fn uptime_secs() -> u64 {
    HOST_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 50; // 50 ticks per second
pub const STANDINGS_TPS: u32 = 5; // 5 standings publications per second
pub const REPLAY_FPS: u32 = 25; // replay capture rate, independent of the tick rate
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Calculate delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Convert a duration in seconds to whole milliseconds, saturating at zero
pub fn secs_to_millis(secs: f64) -> u32 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * 1000.0).round().min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_matches_rate() {
        assert!((tick_delta() - 0.02).abs() < 1e-6);
        assert_eq!(TICK_DURATION_MICROS, 20_000);
    }

    #[test]
    fn secs_to_millis_rounds_and_saturates() {
        assert_eq!(secs_to_millis(1.2345), 1235);
        assert_eq!(secs_to_millis(-3.0), 0);
        assert_eq!(secs_to_millis(f64::NAN), 0);
    }
}

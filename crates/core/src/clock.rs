//! Frame clock for pacing the render loop.

use std::time::{Duration, Instant};

/// Monotonic clock owned by the render loop.
///
/// Holds the start time and the time of the last tick so every frame can
/// query both total elapsed time and the delta since the previous frame.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
    last_tick: Instant,
}

impl Clock {
    /// Create a new clock, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the clock was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Reset the clock to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_clock_elapsed_is_monotonic() {
        let clock = Clock::new();
        let first = clock.elapsed();
        sleep(Duration::from_millis(1));
        let second = clock.elapsed();
        assert!(second >= first);
    }

    #[test]
    fn test_clock_tick_resets_delta() {
        let mut clock = Clock::new();
        sleep(Duration::from_millis(1));
        let first = clock.tick();
        let second = clock.tick();
        assert!(first >= Duration::from_millis(1));
        assert!(second <= first);
    }

    #[test]
    fn test_clock_reset() {
        let mut clock = Clock::new();
        sleep(Duration::from_millis(1));
        clock.reset();
        assert!(clock.elapsed_secs() < 1.0);
    }
}

//! Windowed frames-per-second counter

use std::time::Instant;

/// Frame rate recomputed over one-second wall-clock windows.
///
/// Between window boundaries the last computed rate is reported unchanged;
/// it reads 0.0 until the first window closes.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    count: u32,
    window_start: Instant,
    current: f32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::starting_at(Instant::now())
    }
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first window opens at `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            count: 0,
            window_start: start,
            current: 0.0,
        }
    }

    /// Count one captured frame now
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Count one captured frame at `now`
    pub fn record_at(&mut self, now: Instant) {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f32();

        if elapsed >= 1.0 {
            self.current = self.count as f32 / elapsed;
            self.count = 0;
            self.window_start = now;
        }
    }

    /// Rate computed at the last window boundary
    pub fn fps(&self) -> f32 {
        self.current
    }
}

//! Fixed-rate frame loop driving [`OnlineClient::tick`](cadence_online::OnlineClient::tick).
//!
//! Steps run from an accumulator so a slow frame is caught up with extra
//! steps instead of stretching the session's timers.

use std::time::{Duration, Instant};
use tracing::warn;

/// Fixed step: 60 Hz.
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Longest frame that is caught up; anything longer is dropped.
pub const MAX_FRAME_TIME: f64 = 0.25;

pub struct TickLoop {
    previous_time: Instant,
    accumulator: f64,
    step_count: u64,
}

impl TickLoop {
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            accumulator: 0.0,
            step_count: 0,
        }
    }

    /// Measure elapsed time and call `step` once per elapsed fixed step.
    pub fn tick(&mut self, step: impl FnMut()) {
        let current_time = Instant::now();
        let frame_time = current_time
            .duration_since(self.previous_time)
            .as_secs_f64();
        self.previous_time = current_time;

        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
        }
        self.advance(frame_time, step);
    }

    fn advance(&mut self, frame_time: f64, mut step: impl FnMut()) {
        self.accumulator += frame_time.min(MAX_FRAME_TIME);
        while self.accumulator >= FIXED_DT {
            step();
            self.accumulator -= FIXED_DT;
            self.step_count += 1;
        }
    }

    /// Time left until the next step is due.
    pub fn time_until_next_step(&self) -> Duration {
        Duration::from_secs_f64((FIXED_DT - self.accumulator).max(0.0))
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new()
    }
}

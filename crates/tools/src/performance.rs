use std::time::Duration;

use volterra_common::FrameTime;

use crate::component::{Component, DebugInfo, Drawable, FrameContext, Updateable};

/// Ring buffer of recent frame durations.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    history: Vec<Duration>,
    next: usize,
    filled: bool,
}

impl FrameTimer {
    /// A timer remembering the last `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            history: vec![Duration::ZERO; capacity.max(1)],
            next: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.next] = dt;
        self.next = (self.next + 1) % self.history.len();
        if self.next == 0 {
            self.filled = true;
        }
    }

    fn recorded(&self) -> &[Duration] {
        if self.filled {
            &self.history
        } else {
            &self.history[..self.next]
        }
    }

    pub fn count(&self) -> usize {
        self.recorded().len()
    }

    pub fn average(&self) -> Duration {
        let recorded = self.recorded();
        if recorded.is_empty() {
            return Duration::ZERO;
        }
        recorded.iter().sum::<Duration>() / recorded.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.recorded().iter().copied().min().unwrap_or(Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.recorded().iter().copied().max().unwrap_or(Duration::ZERO)
    }
}

/// Rates measured over one check interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceSnapshot {
    pub frames_per_second: u64,
    pub draw_calls_per_frame: u64,
    pub draw_calls_per_second: u64,
    pub primitives_per_frame: u64,
    pub primitives_per_second: u64,
    pub updates_per_second: u64,
}

/// Collects frame, draw and update rates of the graphics loop.
///
/// Counts accumulate on every update and draw; rates are recomputed once
/// more than one check interval has elapsed, then the counters restart.
#[derive(Debug, Clone)]
pub struct GraphicsPerformance {
    check_interval: Duration,
    elapsed_since_check: Duration,
    frames_since_check: u64,
    draws_since_check: u64,
    primitives_since_check: u64,
    updates_since_check: u64,
    draws_per_frame: u64,
    primitives_per_frame: u64,
    snapshot: Option<PerformanceSnapshot>,
    frame_timer: FrameTimer,
    update_order: i32,
    draw_order: i32,
    debug_order: i32,
    enabled: bool,
}

impl Default for GraphicsPerformance {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsPerformance {
    pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);
    const FRAME_HISTORY: usize = 120;

    pub fn new() -> Self {
        Self {
            check_interval: Self::CHECK_INTERVAL,
            elapsed_since_check: Duration::ZERO,
            frames_since_check: 0,
            draws_since_check: 0,
            primitives_since_check: 0,
            updates_since_check: 0,
            draws_per_frame: 0,
            primitives_per_frame: 0,
            snapshot: None,
            frame_timer: FrameTimer::new(Self::FRAME_HISTORY),
            update_order: 0,
            draw_order: 0,
            debug_order: 0,
            enabled: true,
        }
    }

    pub fn with_orders(mut self, debug_order: i32, draw_order: i32, update_order: i32) -> Self {
        self.debug_order = debug_order;
        self.draw_order = draw_order;
        self.update_order = update_order;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Rates of the last completed check interval.
    pub fn snapshot(&self) -> Option<PerformanceSnapshot> {
        self.snapshot
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }
}

fn per_second(count: u64, elapsed: Duration) -> u64 {
    (count as f64 / elapsed.as_secs_f64()).round() as u64
}

impl Component for GraphicsPerformance {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Updateable for GraphicsPerformance {
    fn update_order(&self) -> i32 {
        self.update_order
    }

    fn update(&mut self, time: &FrameTime) {
        self.elapsed_since_check += time.elapsed;
        self.updates_since_check += 1;

        if self.elapsed_since_check > self.check_interval {
            let elapsed = self.elapsed_since_check;
            let snapshot = PerformanceSnapshot {
                frames_per_second: per_second(self.frames_since_check, elapsed),
                draw_calls_per_frame: self.draws_per_frame,
                draw_calls_per_second: per_second(self.draws_since_check, elapsed),
                primitives_per_frame: self.primitives_per_frame,
                primitives_per_second: per_second(self.primitives_since_check, elapsed),
                updates_per_second: per_second(self.updates_since_check, elapsed),
            };
            tracing::trace!(?snapshot, "performance check");
            self.snapshot = Some(snapshot);

            self.elapsed_since_check = Duration::ZERO;
            self.frames_since_check = 0;
            self.draws_since_check = 0;
            self.primitives_since_check = 0;
            self.updates_since_check = 0;
        }
    }
}

impl Drawable for GraphicsPerformance {
    fn draw_order(&self) -> i32 {
        self.draw_order
    }

    fn draw(&mut self, frame: &FrameContext) {
        self.frames_since_check += 1;
        self.draws_per_frame = frame.metrics.draw_count;
        self.draws_since_check += frame.metrics.draw_count;
        self.primitives_per_frame = frame.metrics.primitive_count;
        self.primitives_since_check += frame.metrics.primitive_count;
        self.frame_timer.record(frame.time.elapsed);
    }
}

impl DebugInfo for GraphicsPerformance {
    fn debug_order(&self) -> i32 {
        self.debug_order
    }

    fn description(&self) -> &str {
        "Graphics Performance"
    }

    fn debug_info(&self) -> String {
        let Some(s) = self.snapshot else {
            return String::new();
        };
        format!(
            "Frames per second: {}\n\
             Draw calls per frame: {}\n\
             Draw calls per second: {}\n\
             Primitives per frame: {}\n\
             Primitives per second: {}\n\
             Updates per second: {}\n\
             Frame time: avg {:?}, min {:?}, max {:?}",
            s.frames_per_second,
            s.draw_calls_per_frame,
            s.draw_calls_per_second,
            s.primitives_per_frame,
            s.primitives_per_second,
            s.updates_per_second,
            self.frame_timer.average(),
            self.frame_timer.min(),
            self.frame_timer.max(),
        )
    }
}

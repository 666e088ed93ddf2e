//! Frame pacing against the host clock
//!
//! The host reports elapsed time once per frame. Elapsed time accumulates and
//! each whole frame duration allows one step, up to a fixed number of catch-up
//! steps per update so a long stall never turns into a decode burst.

/// Playback state of a loaded clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    /// Reached the end with looping disabled
    EndOfStream,
}

impl PlaybackState {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::EndOfStream => "end of stream",
        }
    }
}

/// Result of one pacing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame was produced
    Advanced,
    /// The stream ended and playback should halt
    EndOfStream,
    /// No frame this time; try again next update
    Stalled,
}

/// What happened during one [`PlaybackClock::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Steps attempted, never more than the catch-up limit
    pub attempts: u32,
    pub advanced: u32,
    pub reached_end: bool,
}

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frame_duration: f32,
    accumulator: f64,
    max_steps: u32,
}

impl PlaybackClock {
    pub fn new(frame_duration: f32, max_steps: u32) -> Self {
        Self {
            frame_duration: frame_duration.max(f32::EPSILON),
            accumulator: 0.0,
            max_steps: max_steps.max(1),
        }
    }

    pub fn frame_duration(&self) -> f32 {
        self.frame_duration
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Time accumulated toward the next step, in seconds
    pub fn pending(&self) -> f64 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Advance by `delta_seconds`, calling `step` once per due frame.
    ///
    /// Stepping stops early on [`Step::Stalled`]. On [`Step::EndOfStream`] the
    /// accumulator is cleared. Leftover time beyond the catch-up window is
    /// folded back modulo one frame so it cannot grow without bound.
    pub fn tick(&mut self, delta_seconds: f32, mut step: impl FnMut() -> Step) -> TickReport {
        let duration = f64::from(self.frame_duration);
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.accumulator += f64::from(delta_seconds);
        }

        let mut report = TickReport::default();
        while self.accumulator >= duration && report.attempts < self.max_steps {
            self.accumulator -= duration;
            report.attempts += 1;
            match step() {
                Step::Advanced => report.advanced += 1,
                Step::EndOfStream => {
                    self.accumulator = 0.0;
                    report.reached_end = true;
                    return report;
                }
                Step::Stalled => break,
            }
        }

        if self.accumulator > duration * f64::from(self.max_steps) {
            self.accumulator %= duration;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 30.0;

    #[test]
    fn test_one_step_per_frame_duration() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let mut steps = 0;
        for _ in 0..10 {
            let report = clock.tick(FRAME, || {
                steps += 1;
                Step::Advanced
            });
            assert_eq!(report.attempts, 1);
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn test_short_deltas_accumulate() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let report = clock.tick(FRAME / 2.0, || Step::Advanced);
        assert_eq!(report.attempts, 0);
        let report = clock.tick(FRAME, || Step::Advanced);
        assert_eq!(report.attempts, 1);
        assert!(clock.pending() > 0.0);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let report = clock.tick(FRAME * 5.0, || Step::Advanced);
        assert_eq!(report.attempts, 4);
        assert!(clock.pending() <= f64::from(FRAME) * 1.01);
    }

    #[test]
    fn test_long_stall_is_folded() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let report = clock.tick(10.0, || Step::Advanced);
        assert_eq!(report.attempts, 4);
        assert!(clock.pending() < f64::from(FRAME));
    }

    #[test]
    fn test_end_of_stream_clears_accumulator() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let report = clock.tick(FRAME * 3.0, || Step::EndOfStream);
        assert!(report.reached_end);
        assert_eq!(report.attempts, 1);
        assert_eq!(clock.pending(), 0.0);
    }

    #[test]
    fn test_stall_stops_stepping() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        let report = clock.tick(FRAME * 3.0, || Step::Stalled);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.advanced, 0);
    }

    #[test]
    fn test_invalid_delta_ignored() {
        let mut clock = PlaybackClock::new(FRAME, 4);
        assert_eq!(clock.tick(f32::NAN, || Step::Advanced).attempts, 0);
        assert_eq!(clock.tick(-1.0, || Step::Advanced).attempts, 0);
        assert_eq!(clock.pending(), 0.0);
    }
}

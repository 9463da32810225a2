use crate::constants::DECISION_PERIOD_S;

/// Fixed-period decision scheduler driven by simulated time.
///
/// `advance` turns elapsed time into a number of due decision ticks. The first
/// tick after `start` fires immediately. `restart` stops the current loop,
/// throws away any accumulated time and bumps the generation, so a caller
/// holding an older generation knows its loop is gone.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionClock {
    period: f32,
    accumulator: f32,
    generation: u64,
    running: bool,
}

impl Default for DecisionClock {
    fn default() -> Self {
        Self::new(DECISION_PERIOD_S)
    }
}

impl DecisionClock {
    pub fn new(period: f32) -> Self {
        Self {
            period: period.max(f32::EPSILON),
            accumulator: 0.0,
            generation: 0,
            running: false,
        }
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.accumulator = self.period;
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.accumulator = 0.0;
            self.generation += 1;
        }
    }

    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    /// Number of decision ticks that fell due during `dt`.
    pub fn advance(&mut self, dt: f32) -> u32 {
        if !self.running {
            return 0;
        }
        self.accumulator += dt.max(0.0);
        let mut due = 0;
        while self.accumulator >= self.period {
            self.accumulator -= self.period;
            due += 1;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_clock_never_fires() {
        let mut clock = DecisionClock::new(0.5);
        assert_eq!(clock.advance(10.0), 0);
    }

    #[test]
    fn fires_immediately_then_on_period() {
        let mut clock = DecisionClock::new(0.5);
        clock.start();
        assert_eq!(clock.advance(0.0), 1);
        assert_eq!(clock.advance(0.25), 0);
        assert_eq!(clock.advance(0.25), 1);
        assert_eq!(clock.advance(1.0), 2);
    }

    #[test]
    fn restart_discards_backlog_and_bumps_generation() {
        let mut clock = DecisionClock::new(0.5);
        clock.start();
        clock.advance(0.0);
        clock.advance(0.375);
        let before = clock.generation();
        clock.restart();
        assert_eq!(clock.generation(), before + 1);
        assert!(clock.is_running());
        assert_eq!(clock.advance(0.0), 1);
        assert_eq!(clock.advance(0.25), 0);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut clock = DecisionClock::new(0.5);
        clock.start();
        clock.advance(0.0);
        clock.start();
        assert_eq!(clock.advance(0.0), 0);
        assert_eq!(clock.generation(), 0);
    }
}

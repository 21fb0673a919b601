use serde::Serialize;

/// One-second countdown owned by the session controller. The controller's
/// clock calls `tick` once per second; nothing here keeps time on its own,
/// which keeps the state machine deterministic under test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub remaining: u32,
    pub running: bool,
    pub paused: bool,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or paused: no time passed.
    Idle,
    Ticked { remaining: u32 },
    /// Reached zero. Fired exactly once; the countdown stops itself so an
    /// overlapping manual transition cannot double-fire the exit.
    Finished,
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            remaining: 0,
            running: false,
            paused: false,
        }
    }

    pub fn start(&mut self, seconds: u32) {
        self.remaining = seconds;
        self.running = seconds > 0;
        self.paused = false;
    }

    pub fn cancel(&mut self) {
        self.running = false;
        self.paused = false;
        self.remaining = 0;
    }

    pub fn pause(&mut self) {
        if self.running {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.paused {
            return TickOutcome::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            TickOutcome::Finished
        } else {
            TickOutcome::Ticked {
                remaining: self.remaining,
            }
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_to_a_single_finish() {
        let mut countdown = Countdown::new();
        countdown.start(3);

        assert_eq!(countdown.tick(), TickOutcome::Ticked { remaining: 2 });
        assert_eq!(countdown.tick(), TickOutcome::Ticked { remaining: 1 });
        assert_eq!(countdown.tick(), TickOutcome::Finished);
        // Further ticks never fire again.
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
    }

    #[test]
    fn paused_countdown_holds_its_remaining() {
        let mut countdown = Countdown::new();
        countdown.start(30);
        countdown.pause();

        for _ in 0..5 {
            assert_eq!(countdown.tick(), TickOutcome::Idle);
        }
        assert_eq!(countdown.remaining, 30);

        countdown.resume();
        assert_eq!(countdown.tick(), TickOutcome::Ticked { remaining: 29 });
    }

    #[test]
    fn cancel_stops_without_firing() {
        let mut countdown = Countdown::new();
        countdown.start(2);
        countdown.cancel();
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.remaining, 0);
    }

    #[test]
    fn pause_is_meaningless_while_stopped() {
        let mut countdown = Countdown::new();
        countdown.pause();
        assert!(!countdown.paused);
    }

    #[test]
    fn zero_length_start_never_runs() {
        let mut countdown = Countdown::new();
        countdown.start(0);
        assert!(!countdown.running);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
    }
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Cancelled or already expired; nothing happened.
    Idle,
    Running { remaining_secs: u32 },
    /// Crossed a configured remaining-time mark.
    Warning { remaining_secs: u32 },
    Expired,
}

/// Single authoritative attempt clock, advanced once per second.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    remaining_secs: u32,
    warnings: Vec<u32>,
    next_warning: usize,
    cancelled: bool,
}

impl CountdownTimer {
    /// `warnings` are remaining-time marks; marks at or above the starting
    /// duration never fire.
    #[must_use]
    pub fn new(duration_secs: u32, warnings: &[u32]) -> Self {
        let mut marks: Vec<u32> = warnings
            .iter()
            .copied()
            .filter(|mark| *mark > 0 && *mark < duration_secs)
            .collect();
        marks.sort_unstable_by(|a, b| b.cmp(a));
        marks.dedup();
        Self {
            remaining_secs: duration_secs,
            warnings: marks,
            next_warning: 0,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Stop the timer for good; later ticks are `Idle`.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn tick(&mut self) -> TimerTick {
        if self.cancelled || self.remaining_secs == 0 {
            return TimerTick::Idle;
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            self.cancelled = true;
            return TimerTick::Expired;
        }

        let mut crossed = false;
        while self
            .warnings
            .get(self.next_warning)
            .is_some_and(|mark| self.remaining_secs <= *mark)
        {
            self.next_warning += 1;
            crossed = true;
        }
        if crossed {
            TimerTick::Warning {
                remaining_secs: self.remaining_secs,
            }
        } else {
            TimerTick::Running {
                remaining_secs: self.remaining_secs,
            }
        }
    }
}

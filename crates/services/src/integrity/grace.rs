use chrono::{DateTime, Duration, Utc};

use quiz_core::time::seconds_until;

/// One step of a grace-period detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceUpdate {
    /// Nothing to report.
    Quiet,
    Started { remaining_secs: u32 },
    Countdown { remaining_secs: u32 },
    /// The condition cleared before the deadline.
    Cleared,
    /// The deadline passed with the condition still present.
    Expired,
}

/// Single-shot grace timer shared by the focus-loss and viewport detectors.
///
/// At most one deadline is outstanding; re-detection while pending only
/// advances the countdown.
#[derive(Debug, Clone)]
pub struct GraceTimer {
    window: Duration,
    deadline: Option<DateTime<Utc>>,
    last_announced: Option<u32>,
}

impl GraceTimer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            last_announced: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Feed whether the condition currently holds. When `may_start` is false
    /// a new grace period is not opened (another detector's is pending).
    pub fn observe(&mut self, condition: bool, may_start: bool, now: DateTime<Utc>) -> GraceUpdate {
        match (condition, self.deadline) {
            (false, None) => GraceUpdate::Quiet,
            (false, Some(_)) => {
                self.clear();
                GraceUpdate::Cleared
            }
            (true, None) if !may_start => GraceUpdate::Quiet,
            (true, None) => {
                let deadline = now + self.window;
                let remaining_secs = seconds_until(deadline, now);
                self.deadline = Some(deadline);
                self.last_announced = Some(remaining_secs);
                GraceUpdate::Started { remaining_secs }
            }
            (true, Some(deadline)) if now >= deadline => {
                self.clear();
                GraceUpdate::Expired
            }
            (true, Some(deadline)) => {
                let remaining_secs = seconds_until(deadline, now);
                if self.last_announced == Some(remaining_secs) {
                    return GraceUpdate::Quiet;
                }
                self.last_announced = Some(remaining_secs);
                GraceUpdate::Countdown { remaining_secs }
            }
        }
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.last_announced = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;

    #[test]
    fn countdown_then_expiry() {
        let mut grace = GraceTimer::new(Duration::seconds(5));
        let t0 = fixed_now();
        assert_eq!(
            grace.observe(true, true, t0),
            GraceUpdate::Started { remaining_secs: 5 }
        );
        assert_eq!(
            grace.observe(true, true, t0 + Duration::seconds(1)),
            GraceUpdate::Countdown { remaining_secs: 4 }
        );
        assert_eq!(
            grace.observe(true, true, t0 + Duration::milliseconds(1_500)),
            GraceUpdate::Quiet
        );
        assert_eq!(
            grace.observe(true, true, t0 + Duration::seconds(5)),
            GraceUpdate::Expired
        );
        assert!(!grace.is_pending());
    }

    #[test]
    fn condition_clearing_cancels_silently() {
        let mut grace = GraceTimer::new(Duration::seconds(5));
        let t0 = fixed_now();
        grace.observe(true, true, t0);
        assert_eq!(
            grace.observe(false, true, t0 + Duration::seconds(2)),
            GraceUpdate::Cleared
        );
        assert_eq!(
            grace.observe(false, true, t0 + Duration::seconds(3)),
            GraceUpdate::Quiet
        );
    }

    #[test]
    fn blocked_start_stays_quiet() {
        let mut grace = GraceTimer::new(Duration::seconds(5));
        assert_eq!(grace.observe(true, false, fixed_now()), GraceUpdate::Quiet);
        assert!(!grace.is_pending());
    }

    #[test]
    fn redetection_keeps_original_deadline() {
        let mut grace = GraceTimer::new(Duration::seconds(5));
        let t0 = fixed_now();
        grace.observe(true, true, t0);
        grace.observe(true, true, t0 + Duration::seconds(3));
        assert_eq!(
            grace.observe(true, true, t0 + Duration::seconds(5)),
            GraceUpdate::Expired
        );
    }
}

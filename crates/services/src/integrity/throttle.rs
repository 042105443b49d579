use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use quiz_core::model::ViolationKind;
use quiz_core::time::elapsed_at_least;

/// Drops repeats of the same violation kind raised within `gap`.
#[derive(Debug, Clone)]
pub struct SignalThrottle {
    gap: Duration,
    last: HashMap<ViolationKind, DateTime<Utc>>,
}

impl SignalThrottle {
    #[must_use]
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            last: HashMap::new(),
        }
    }

    /// Returns true (and records `now`) if `kind` may be raised.
    pub fn admit(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> bool {
        if let Some(previous) = self.last.get(&kind) {
            if !elapsed_at_least(*previous, now, self.gap) {
                return false;
            }
        }
        self.last.insert(kind, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;

    #[test]
    fn repeats_inside_gap_are_dropped() {
        let mut throttle = SignalThrottle::new(Duration::milliseconds(500));
        let now = fixed_now();
        assert!(throttle.admit(ViolationKind::ContextMenu, now));
        assert!(!throttle.admit(ViolationKind::ContextMenu, now + Duration::milliseconds(499)));
        assert!(throttle.admit(ViolationKind::ContextMenu, now + Duration::milliseconds(500)));
    }

    #[test]
    fn kinds_are_throttled_independently() {
        let mut throttle = SignalThrottle::new(Duration::milliseconds(500));
        let now = fixed_now();
        assert!(throttle.admit(ViolationKind::ContextMenu, now));
        assert!(throttle.admit(ViolationKind::EscapeKey, now));
    }
}

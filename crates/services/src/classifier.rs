//! Maps integrity violations to their consequence.

use quiz_core::model::{Severity, Violation, ViolationKind};

use crate::submission::SubmitTrigger;

/// What recording a violation means for the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consequence {
    /// Minor violation inside the budget.
    Warn { remaining: u32 },
    /// The attempt must be submitted now.
    Submit(SubmitTrigger),
}

/// Minor violations counted against a fixed maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationBudget {
    max: u32,
    count: u32,
    history: Vec<Violation>,
}

impl ViolationBudget {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            max: max.max(1),
            count: 0,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.count)
    }

    /// Every violation recorded so far, majors included.
    #[must_use]
    pub fn history(&self) -> &[Violation] {
        &self.history
    }

    pub fn classify(&mut self, violation: Violation) -> Consequence {
        let kind = violation.kind;
        let severity = violation.severity();
        self.history.push(violation);
        match severity {
            Severity::Major => Consequence::Submit(SubmitTrigger::MajorViolation(kind)),
            Severity::Minor => {
                self.count = self.count.saturating_add(1);
                if self.count >= self.max {
                    Consequence::Submit(SubmitTrigger::ViolationLimit(self.max))
                } else {
                    Consequence::Warn {
                        remaining: self.remaining(),
                    }
                }
            }
        }
    }
}

/// Text of the transient notice that accompanies a violation.
#[must_use]
pub fn notice_text(kind: ViolationKind, consequence: &Consequence) -> String {
    match consequence {
        Consequence::Warn { remaining: 1 } => format!("{}. 1 attempt remaining", kind.label()),
        Consequence::Warn { remaining } => {
            format!("{}. {remaining} attempts remaining", kind.label())
        }
        Consequence::Submit(trigger) => format!("{}. Submitting quiz", trigger.reason()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;

    fn minor() -> Violation {
        Violation::new(ViolationKind::ContextMenu, fixed_now())
    }

    #[test]
    fn remaining_tracks_minor_count() {
        let mut budget = ViolationBudget::new(3);
        assert_eq!(budget.classify(minor()), Consequence::Warn { remaining: 2 });
        assert_eq!(budget.classify(minor()), Consequence::Warn { remaining: 1 });
        assert_eq!(
            budget.classify(minor()),
            Consequence::Submit(SubmitTrigger::ViolationLimit(3))
        );
        assert_eq!(budget.count(), 3);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn majors_submit_without_spending_budget() {
        let mut budget = ViolationBudget::new(3);
        let major = Violation::new(ViolationKind::TabSwitch, fixed_now());
        assert_eq!(
            budget.classify(major),
            Consequence::Submit(SubmitTrigger::MajorViolation(ViolationKind::TabSwitch))
        );
        assert_eq!(budget.count(), 0);
        assert_eq!(budget.history().len(), 1);
    }

    #[test]
    fn notice_names_violation_and_remaining() {
        assert_eq!(
            notice_text(ViolationKind::ContextMenu, &Consequence::Warn { remaining: 2 }),
            "Right-click is disabled. 2 attempts remaining"
        );
        assert_eq!(
            notice_text(
                ViolationKind::ContextMenu,
                &Consequence::Submit(SubmitTrigger::ViolationLimit(3))
            ),
            "Reached maximum violations (3). Submitting quiz"
        );
    }
}

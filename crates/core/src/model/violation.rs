use chrono::{DateTime, Utc};

/// Consequence class of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Counted against the violation budget.
    Minor,
    /// Ends the attempt immediately.
    Major,
}

/// Every integrity signal a detector can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    FullscreenExited,
    TabSwitch,
    FocusNotRegained,
    NewWindowShortcut,
    EscapeKey,
    AltTab,
    DevtoolsShortcut,
    SaveShortcut,
    PrintShortcut,
    ViewSourceShortcut,
    DevtoolsSuspected,
    ContextMenu,
    MultipleInstances,
    BackNavigation,
}

impl ViolationKind {
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            ViolationKind::TabSwitch
            | ViolationKind::FocusNotRegained
            | ViolationKind::NewWindowShortcut
            | ViolationKind::MultipleInstances
            | ViolationKind::BackNavigation => Severity::Major,
            ViolationKind::FullscreenExited
            | ViolationKind::EscapeKey
            | ViolationKind::AltTab
            | ViolationKind::DevtoolsShortcut
            | ViolationKind::SaveShortcut
            | ViolationKind::PrintShortcut
            | ViolationKind::ViewSourceShortcut
            | ViolationKind::DevtoolsSuspected
            | ViolationKind::ContextMenu => Severity::Minor,
        }
    }

    /// Human-readable label, also used as the submission reason for majors.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ViolationKind::FullscreenExited => "Fullscreen exited",
            ViolationKind::TabSwitch => "Tab or app switch",
            ViolationKind::FocusNotRegained => "Window focus not regained",
            ViolationKind::NewWindowShortcut => "New tab or window shortcut",
            ViolationKind::EscapeKey => "Escape key pressed",
            ViolationKind::AltTab => "Alt+Tab pressed",
            ViolationKind::DevtoolsShortcut => "Developer tools shortcut",
            ViolationKind::SaveShortcut => "Save shortcut",
            ViolationKind::PrintShortcut => "Print shortcut",
            ViolationKind::ViewSourceShortcut => "View source shortcut",
            ViolationKind::DevtoolsSuspected => "Developer tools or window resize detected",
            ViolationKind::ContextMenu => "Right-click is disabled",
            ViolationKind::MultipleInstances => "Multiple quiz instances detected",
            ViolationKind::BackNavigation => "Back button navigation attempted",
        }
    }
}

/// A recorded integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub at: DateTime<Utc>,
}

impl Violation {
    #[must_use]
    pub fn new(kind: ViolationKind, at: DateTime<Utc>) -> Self {
        Self { kind, at }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_escapes_are_major() {
        for kind in [
            ViolationKind::TabSwitch,
            ViolationKind::FocusNotRegained,
            ViolationKind::NewWindowShortcut,
            ViolationKind::MultipleInstances,
            ViolationKind::BackNavigation,
        ] {
            assert_eq!(kind.severity(), Severity::Major, "{kind:?}");
        }
    }

    #[test]
    fn budgeted_kinds_are_minor() {
        assert_eq!(ViolationKind::ContextMenu.severity(), Severity::Minor);
        assert_eq!(ViolationKind::EscapeKey.severity(), Severity::Minor);
        assert_eq!(ViolationKind::FullscreenExited.severity(), Severity::Minor);
    }
}

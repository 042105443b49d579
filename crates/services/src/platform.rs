//! Host capabilities the attempt controller drives and polls.

use crate::error::EnvironmentError;

/// What the host environment can do, checked before entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub fullscreen_api: bool,
    pub supported_environment: bool,
}

/// Outer (window) and inner (content) viewport sizes in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportMetrics {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}

impl ViewportMetrics {
    /// Both dimensions equal inside and out.
    #[must_use]
    pub fn uniform(width: u32, height: u32) -> Self {
        Self {
            outer_width: width,
            outer_height: height,
            inner_width: width,
            inner_height: height,
        }
    }

    /// True when either chrome gap exceeds `tolerance`, which is what a docked
    /// developer-tools panel looks like.
    #[must_use]
    pub fn exceeds_tolerance(&self, tolerance: u32) -> bool {
        self.outer_width.saturating_sub(self.inner_width) > tolerance
            || self.outer_height.saturating_sub(self.inner_height) > tolerance
    }
}

/// Point-in-time view of the environment, read on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub fullscreen: bool,
    pub hidden: bool,
    pub focused: bool,
    pub viewport: ViewportMetrics,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            fullscreen: true,
            hidden: false,
            focused: true,
            viewport: ViewportMetrics::uniform(1280, 800),
        }
    }
}

/// Host integration. Polled detectors read `snapshot`; hosts with reliable
/// native events may additionally push changes through the controller's
/// `on_*` handlers.
pub trait ProctorPlatform: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    fn snapshot(&self) -> EnvironmentSnapshot;

    /// # Errors
    ///
    /// Returns `EnvironmentError::FullscreenDenied` if the host refuses.
    fn request_fullscreen(&self) -> Result<(), EnvironmentError>;

    fn exit_fullscreen(&self);

    /// Push the synthetic history entry that absorbs a back navigation.
    fn push_history_guard(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docked_panel_exceeds_tolerance() {
        let mut viewport = ViewportMetrics::uniform(1280, 800);
        assert!(!viewport.exceeds_tolerance(160));
        viewport.inner_width = 1000;
        assert!(viewport.exceeds_tolerance(160));
    }

    #[test]
    fn inner_larger_than_outer_is_not_suspicious() {
        let viewport = ViewportMetrics {
            outer_width: 800,
            outer_height: 600,
            inner_width: 900,
            inner_height: 700,
        };
        assert!(!viewport.exceeds_tolerance(0));
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};

use services::{
    EnvironmentError, EnvironmentSnapshot, PlatformCapabilities, ProctorPlatform, ViewportMetrics,
};
use tracing::debug;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 800;
const DOCKED_PANEL_PX: u32 = 400;

/// Environment state driven by operator commands instead of a browser.
pub struct TerminalPlatform {
    state: Mutex<EnvironmentSnapshot>,
}

impl TerminalPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EnvironmentSnapshot {
                fullscreen: false,
                hidden: false,
                focused: true,
                viewport: ViewportMetrics::uniform(WIDTH, HEIGHT),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EnvironmentSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.state().fullscreen = fullscreen;
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.state().hidden = hidden;
    }

    pub fn set_focused(&self, focused: bool) {
        self.state().focused = focused;
    }

    pub fn set_docked(&self, docked: bool) {
        let inner_width = if docked { WIDTH - DOCKED_PANEL_PX } else { WIDTH };
        self.state().viewport = ViewportMetrics {
            inner_width,
            ..ViewportMetrics::uniform(WIDTH, HEIGHT)
        };
    }
}

impl ProctorPlatform for TerminalPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            fullscreen_api: true,
            supported_environment: true,
        }
    }

    fn snapshot(&self) -> EnvironmentSnapshot {
        *self.state()
    }

    fn request_fullscreen(&self) -> Result<(), EnvironmentError> {
        self.set_fullscreen(true);
        Ok(())
    }

    fn exit_fullscreen(&self) {
        self.set_fullscreen(false);
    }

    fn push_history_guard(&self) {
        debug!("history guard pushed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docking_trips_the_viewport_tolerance() {
        let platform = TerminalPlatform::new();
        platform.set_docked(true);
        assert!(platform.snapshot().viewport.exceeds_tolerance(160));
        platform.set_docked(false);
        assert!(!platform.snapshot().viewport.exceeds_tolerance(160));
    }

    #[test]
    fn fullscreen_follows_requests() {
        let platform = TerminalPlatform::new();
        assert!(!platform.snapshot().fullscreen);
        platform.request_fullscreen().unwrap();
        assert!(platform.snapshot().fullscreen);
        platform.exit_fullscreen();
        assert!(!platform.snapshot().fullscreen);
    }
}

use std::env;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::ConfigError;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Tunables for one proctored attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProctorConfig {
    max_violations: u32,
    signal_throttle_ms: u32,
    focus_grace_secs: u32,
    resize_grace_secs: u32,
    resize_tolerance_px: u32,
    escape_suppression_ms: u32,
    time_warnings_secs: Vec<u32>,
    notice_ttl_ms: u32,
    token_refresh_threshold_secs: u32,
    token_check_interval_secs: u32,
    poll_interval_ms: u32,
    min_viewport_width: u32,
    min_viewport_height: u32,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            max_violations: 3,
            signal_throttle_ms: 500,
            focus_grace_secs: 5,
            resize_grace_secs: 5,
            resize_tolerance_px: 160,
            escape_suppression_ms: 1_000,
            time_warnings_secs: vec![300, 60, 30],
            notice_ttl_ms: 3_000,
            token_refresh_threshold_secs: 15 * 60,
            token_check_interval_secs: 60,
            poll_interval_ms: 1_000,
            min_viewport_width: 320,
            min_viewport_height: 480,
        }
    }
}

/// Partially specified configuration; unset fields keep their defaults.
#[derive(Clone, Debug, Default)]
pub struct ProctorConfigDraft {
    pub max_violations: Option<u32>,
    pub focus_grace_secs: Option<u32>,
    pub resize_grace_secs: Option<u32>,
    pub time_warnings_secs: Option<Vec<u32>>,
    pub poll_interval_ms: Option<u32>,
    pub token_refresh_threshold_secs: Option<u32>,
}

impl ProctorConfigDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `QUIZ_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_violations: parse_env("QUIZ_MAX_VIOLATIONS")?,
            focus_grace_secs: parse_env("QUIZ_FOCUS_GRACE_SECS")?,
            resize_grace_secs: parse_env("QUIZ_RESIZE_GRACE_SECS")?,
            time_warnings_secs: parse_list_env("QUIZ_TIME_WARNINGS")?,
            poll_interval_ms: parse_env("QUIZ_POLL_INTERVAL_MS")?,
            token_refresh_threshold_secs: parse_env("QUIZ_TOKEN_REFRESH_THRESHOLD_SECS")?,
        })
    }

    /// Validate and merge the draft over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any override is out of range.
    pub fn validate(self) -> Result<ProctorConfig, ConfigError> {
        let mut config = ProctorConfig::default();

        if let Some(max) = self.max_violations {
            if !(1..=10).contains(&max) {
                return Err(ConfigError::InvalidMaxViolations);
            }
            config.max_violations = max;
        }
        for (value, slot) in [
            (self.focus_grace_secs, &mut config.focus_grace_secs),
            (self.resize_grace_secs, &mut config.resize_grace_secs),
        ] {
            if let Some(secs) = value {
                if !(1..=60).contains(&secs) {
                    return Err(ConfigError::InvalidGracePeriod);
                }
                *slot = secs;
            }
        }
        if let Some(ms) = self.poll_interval_ms {
            if !(100..=10_000).contains(&ms) {
                return Err(ConfigError::InvalidPollInterval);
            }
            config.poll_interval_ms = ms;
        }
        if let Some(mut warnings) = self.time_warnings_secs {
            warnings.retain(|secs| *secs > 0);
            warnings.sort_unstable_by(|a, b| b.cmp(a));
            warnings.dedup();
            config.time_warnings_secs = warnings;
        }
        if let Some(secs) = self.token_refresh_threshold_secs {
            config.token_refresh_threshold_secs = secs;
        }

        Ok(config)
    }
}

impl ProctorConfig {
    /// Defaults overridden by any valid `QUIZ_*` environment variables.
    ///
    /// Invalid overrides are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        match ProctorConfigDraft::from_env().and_then(ProctorConfigDraft::validate) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "ignoring proctor overrides from environment");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    #[must_use]
    pub fn signal_throttle(&self) -> Duration {
        Duration::milliseconds(i64::from(self.signal_throttle_ms))
    }

    #[must_use]
    pub fn focus_grace(&self) -> Duration {
        Duration::seconds(i64::from(self.focus_grace_secs))
    }

    #[must_use]
    pub fn resize_grace(&self) -> Duration {
        Duration::seconds(i64::from(self.resize_grace_secs))
    }

    #[must_use]
    pub fn resize_tolerance_px(&self) -> u32 {
        self.resize_tolerance_px
    }

    #[must_use]
    pub fn escape_suppression(&self) -> Duration {
        Duration::milliseconds(i64::from(self.escape_suppression_ms))
    }

    /// Remaining-time marks (seconds), largest first.
    #[must_use]
    pub fn time_warnings_secs(&self) -> &[u32] {
        &self.time_warnings_secs
    }

    #[must_use]
    pub fn notice_ttl(&self) -> StdDuration {
        StdDuration::from_millis(u64::from(self.notice_ttl_ms))
    }

    #[must_use]
    pub fn token_refresh_threshold(&self) -> Duration {
        Duration::seconds(i64::from(self.token_refresh_threshold_secs))
    }

    #[must_use]
    pub fn token_check_interval(&self) -> StdDuration {
        StdDuration::from_secs(u64::from(self.token_check_interval_secs))
    }

    #[must_use]
    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_millis(u64::from(self.poll_interval_ms))
    }

    #[must_use]
    pub fn min_viewport(&self) -> (u32, u32) {
        (self.min_viewport_width, self.min_viewport_height)
    }
}

/// Where the quiz backend lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
}

impl ApiConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `base_url` is not an absolute URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if Url::parse(&base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl);
        }
        Ok(Self { base_url })
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `QUIZ_API_BASE_URL` is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("QUIZ_API_BASE_URL").unwrap_or_else(|_| {
            info!("QUIZ_API_BASE_URL not set, using default: {DEFAULT_API_BASE_URL}");
            DEFAULT_API_BASE_URL.into()
        });
        Self::new(base_url)
    }
}

fn parse_env(key: &'static str) -> Result<Option<u32>, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { key, raw })
}

fn parse_list_env(key: &'static str) -> Result<Option<Vec<u32>>, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    parse_list(&raw)
        .map(Some)
        .ok_or(ConfigError::InvalidEnv { key, raw })
}

fn parse_list(raw: &str) -> Option<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProctorConfig::default();
        assert_eq!(config.max_violations(), 3);
        assert_eq!(config.signal_throttle(), Duration::milliseconds(500));
        assert_eq!(config.focus_grace(), Duration::seconds(5));
        assert_eq!(config.token_refresh_threshold(), Duration::minutes(15));
    }

    #[test]
    fn draft_rejects_out_of_range_budget() {
        let draft = ProctorConfigDraft {
            max_violations: Some(0),
            ..ProctorConfigDraft::default()
        };
        assert_eq!(draft.validate(), Err(ConfigError::InvalidMaxViolations));
    }

    #[test]
    fn draft_normalizes_warning_marks() {
        let draft = ProctorConfigDraft {
            time_warnings_secs: Some(vec![30, 0, 300, 30, 60]),
            max_violations: Some(5),
            ..ProctorConfigDraft::default()
        };
        let config = draft.validate().unwrap();
        assert_eq!(config.time_warnings_secs(), &[300, 60, 30]);
        assert_eq!(config.max_violations(), 5);
    }

    #[test]
    fn list_parsing_rejects_garbage() {
        assert_eq!(parse_list("300, 60 ,30"), Some(vec![300, 60, 30]));
        assert_eq!(parse_list("300,soon"), None);
    }

    #[test]
    fn api_config_trims_trailing_slash() {
        let config = ApiConfig::new("https://quiz.example.com/api/").unwrap();
        assert_eq!(config.base_url, "https://quiz.example.com/api");
        assert_eq!(ApiConfig::new("not a url"), Err(ConfigError::InvalidBaseUrl));
    }
}

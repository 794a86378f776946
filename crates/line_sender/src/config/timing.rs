//! Timing configuration for UI waits and speed presets

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

fn env_ms(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Base wait durations in milliseconds, before speed scaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub after_tap: u64,
    pub after_type: u64,
    pub after_send: u64,
    pub between_targets: u64,
    pub page_load: u64,
    pub scroll_wait: u64,
    /// Pause between the individual steps of a text injection.
    pub injection_step: u64,
    pub app_launch: u64,
    pub foreground_poll: u64,
    pub foreground_timeout: u64,
    pub pause_poll: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            after_tap: env_ms("LINE_SENDER_DELAY_AFTER_TAP", 1000),
            after_type: env_ms("LINE_SENDER_DELAY_AFTER_TYPE", 500),
            after_send: env_ms("LINE_SENDER_DELAY_AFTER_SEND", 2000),
            between_targets: env_ms("LINE_SENDER_DELAY_BETWEEN_TARGETS", 3000),
            page_load: env_ms("LINE_SENDER_DELAY_PAGE_LOAD", 2000),
            scroll_wait: env_ms("LINE_SENDER_DELAY_SCROLL_WAIT", 1000),
            injection_step: env_ms("LINE_SENDER_DELAY_INJECTION_STEP", 150),
            app_launch: env_ms("LINE_SENDER_DELAY_APP_LAUNCH", 3000),
            foreground_poll: env_ms("LINE_SENDER_FOREGROUND_POLL", 1000),
            foreground_timeout: env_ms("LINE_SENDER_FOREGROUND_TIMEOUT", 15000),
            pause_poll: env_ms("LINE_SENDER_PAUSE_POLL", 500),
        }
    }
}

lazy_static! {
    /// Default timing configuration, read once from the environment
    pub static ref TIMING_CONFIG: TimingConfig = TimingConfig::default();
}

/// Speed preset applied as a multiplier to every wait duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Normal,
    #[default]
    Fast,
    Turbo,
    Custom(f64),
}

impl Speed {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Fast => 0.5,
            Self::Turbo => 0.25,
            Self::Custom(m) => *m,
        }
    }

    /// Scale a base duration in milliseconds by this speed.
    pub fn scale(&self, base_ms: u64) -> Duration {
        let scaled = (base_ms as f64 * self.multiplier()).round();
        Duration::from_millis(scaled.max(0.0) as u64)
    }

    pub fn as_str(&self) -> String {
        match self {
            Self::Normal => "normal".to_string(),
            Self::Fast => "fast".to_string(),
            Self::Turbo => "turbo".to_string(),
            Self::Custom(m) => format!("x{}", m),
        }
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            "turbo" => Ok(Self::Turbo),
            other => match other.trim_start_matches('x').parse::<f64>() {
                Ok(m) if m > 0.0 && m.is_finite() => Ok(Self::Custom(m)),
                _ => Err(format!("Unknown speed: {}", s)),
            },
        }
    }
}

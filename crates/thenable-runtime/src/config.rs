//! Runtime Configuration

use serde::{Deserialize, Serialize};

/// Host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Whether native promises expose their state synchronously
    pub sync_introspection: bool,
    /// Whether the host can suspend async tasks on promises
    pub await_support: bool,
    /// Log unhandled rejections at the end of each microtask checkpoint
    pub report_unhandled_rejections: bool,
    /// How many undrained reports and uncaught errors the host keeps; older
    /// entries are dropped once the limit is reached
    pub retained_reports: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sync_introspection: true,
            await_support: true,
            report_unhandled_rejections: true,
            retained_reports: 64,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with `THENABLE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        overlay(&lookup, "THENABLE_SYNC_INTROSPECTION", &mut config.sync_introspection)?;
        overlay(&lookup, "THENABLE_AWAIT_SUPPORT", &mut config.await_support)?;
        overlay(&lookup, "THENABLE_REPORT_UNHANDLED", &mut config.report_unhandled_rejections)?;
        if let Some(raw) = lookup("THENABLE_RETAINED_REPORTS") {
            config.retained_reports = raw.trim().parse().map_err(|_| ConfigError::InvalidCount {
                var: "THENABLE_RETAINED_REPORTS",
                value: raw,
            })?;
        }
        Ok(config)
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            sync_introspection: self.sync_introspection,
            await_support: self.await_support,
        }
    }
}

/// Host features visible to libraries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub sync_introspection: bool,
    pub await_support: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid boolean for {var}: {value:?}")]
    InvalidFlag { var: &'static str, value: String },

    #[error("invalid count for {var}: {value:?}")]
    InvalidCount { var: &'static str, value: String },
}

fn overlay(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut bool,
) -> Result<(), ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *target = match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(ConfigError::InvalidFlag { var, value: raw }),
    };
    Ok(())
}

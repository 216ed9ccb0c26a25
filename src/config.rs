//! Configuration for the throttle, the quota ledger and the admission gate.
//!
//! Every field has a default, so an empty JSON object is a valid configuration.
//! [`GovernorConfig::from_json_str`] parses and validates in one step; a value
//! built in code should go through [`GovernorConfig::validate`] before use.
//!
//! ```rust
//! use scenario_governor::config::GovernorConfig;
//! use scenario_governor::throttle::OperationClass;
//!
//! let config = GovernorConfig::from_json_str(
//!     r#"{ "throttle": { "limits": { "chatReply": { "windowMs": 10000, "max": 3 } } } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.throttle.limits.get(OperationClass::ChatReply).max, 3);
//! ```

use crate::throttle::OperationClass;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Offsets beyond ±24h are not real time zones.
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// Errors produced when validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    /// A throttle limit allows no requests at all.
    #[error("throttle max for {operation} must be > 0")]
    ZeroMax {
        /// Operation class with the bad limit.
        operation: OperationClass,
    },
    /// A throttle window has no length.
    #[error("throttle window for {operation} must be > 0")]
    ZeroWindow {
        /// Operation class with the bad window.
        operation: OperationClass,
    },
    /// The sweep interval is zero.
    #[error("throttle sweep interval must be > 0")]
    ZeroSweepInterval,
    /// A tier ceiling is zero.
    #[error("{tier} ceiling must be > 0")]
    ZeroCeiling {
        /// Tier name.
        tier: &'static str,
    },
    /// The premium term is zero days.
    #[error("premium term must be at least one day")]
    ZeroPremiumTerm,
    /// The calendar offset is not a valid UTC offset.
    #[error("utc offset must be within ±{} minutes (got {minutes})", MAX_OFFSET_MINUTES)]
    OffsetOutOfRange {
        /// Value provided by caller.
        minutes: i32,
    },
    /// The generation deadline is zero.
    #[error("generation timeout must be > 0")]
    ZeroGenerationTimeout,
}

/// Window length and request cap for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowLimit {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests allowed per window.
    pub max: u32,
}

impl WindowLimit {
    /// Build a limit from a window duration.
    pub fn new(window: Duration, max: u32) -> Self {
        Self { window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX), max }
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Built-in limit for an operation class.
    pub fn default_for(operation: OperationClass) -> Self {
        match operation {
            OperationClass::Generation => Self { window_ms: 300_000, max: 10 },
            OperationClass::ChatReply => Self { window_ms: 60_000, max: 30 },
            OperationClass::InvestigationReport => Self { window_ms: 60_000, max: 10 },
            OperationClass::PaymentOrder => Self { window_ms: 900_000, max: 5 },
            OperationClass::Guidance => Self { window_ms: 60_000, max: 20 },
        }
    }
}

/// Per-operation limits; classes without an entry use [`WindowLimit::default_for`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThrottleLimits {
    overrides: BTreeMap<OperationClass, WindowLimit>,
}

impl ThrottleLimits {
    /// Limit in force for `operation`.
    pub fn get(&self, operation: OperationClass) -> WindowLimit {
        self.overrides
            .get(&operation)
            .copied()
            .unwrap_or_else(|| WindowLimit::default_for(operation))
    }

    /// Override the limit for one class.
    pub fn set(&mut self, operation: OperationClass, limit: WindowLimit) {
        self.overrides.insert(operation, limit);
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, operation: OperationClass, limit: WindowLimit) -> Self {
        self.set(operation, limit);
        self
    }

    /// Check every class's effective limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for operation in OperationClass::ALL {
            let limit = self.get(operation);
            if limit.max == 0 {
                return Err(ConfigError::ZeroMax { operation });
            }
            if limit.window_ms == 0 {
                return Err(ConfigError::ZeroWindow { operation });
            }
        }
        Ok(())
    }
}

/// Request throttle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ThrottleConfig {
    /// How often expired windows are swept, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Per-operation limits.
    pub limits: ThrottleLimits,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { sweep_interval_ms: 60_000, limits: ThrottleLimits::default() }
    }
}

impl ThrottleConfig {
    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Quota ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct QuotaConfig {
    /// Lifetime generations allowed on the free tier.
    pub free_ceiling: u32,
    /// Generations per calendar day on the premium tier.
    pub premium_ceiling: u32,
    /// Length of a premium subscription in days.
    pub premium_term_days: u32,
    /// Offset from UTC, in minutes, that defines the calendar day.
    pub utc_offset_minutes: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { free_ceiling: 3, premium_ceiling: 50, premium_term_days: 30, utc_offset_minutes: 0 }
    }
}

impl QuotaConfig {
    /// Calendar offset; out-of-range values fall back to UTC (rejected by `validate`).
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Premium subscription length.
    pub fn premium_term(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.premium_term_days))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.free_ceiling == 0 {
            return Err(ConfigError::ZeroCeiling { tier: "free" });
        }
        if self.premium_ceiling == 0 {
            return Err(ConfigError::ZeroCeiling { tier: "premium" });
        }
        if self.premium_term_days == 0 {
            return Err(ConfigError::ZeroPremiumTerm);
        }
        if self.utc_offset_minutes.unsigned_abs() > MAX_OFFSET_MINUTES.unsigned_abs() {
            return Err(ConfigError::OffsetOutOfRange { minutes: self.utc_offset_minutes });
        }
        Ok(())
    }
}

/// Top-level configuration for a [`ScenarioGate`](crate::gate::ScenarioGate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GovernorConfig {
    pub throttle: ThrottleConfig,
    pub quota: QuotaConfig,
    /// Deadline for one generation call, in milliseconds.
    pub generation_timeout_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            quota: QuotaConfig::default(),
            generation_timeout_ms: 120_000,
        }
    }
}

impl GovernorConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: GovernorConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Generation deadline.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.throttle.limits.validate()?;
        if self.throttle.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        self.quota.validate()?;
        if self.generation_timeout_ms == 0 {
            return Err(ConfigError::ZeroGenerationTimeout);
        }
        Ok(())
    }
}

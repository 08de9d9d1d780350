//! Deployment settings for the dependent-object cache.
//!
//! Every tunable follows the same shape: a global default plus optional
//! per-object-type overrides, with lookups falling back to the default when
//! no override is present.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use crate::enums::ExpiryStrategy;
use crate::error::ConfigError;

const DEFAULT_EXPIRY_MINUTES: i64 = 120;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 60;
const DEFAULT_JOB_PERIOD_SECS: u64 = 60;
const DEFAULT_EXPIRY_CHECK_PERIOD_SECS: u64 = 3600;

/// Startup delay and repeat period of one background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    pub startup_delay: Duration,
    pub period: Duration,
}

impl JobSchedule {
    pub fn new(startup_delay: Duration, period: Duration) -> Self {
        Self {
            startup_delay,
            period,
        }
    }
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(DEFAULT_STARTUP_DELAY_SECS),
            period: Duration::from_secs(DEFAULT_JOB_PERIOD_SECS),
        }
    }
}

/// Cache-wide settings with per-type overrides.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Fallback expiry window for types that declare none.
    pub default_expiry_minutes: i64,
    /// Fallback expiry strategy for types that declare none.
    pub default_expiry_strategy: ExpiryStrategy,
    /// Schedule of the global expiry-check job.
    pub expiry_check: JobSchedule,
    /// Default schedule of per-type request jobs.
    pub default_request: JobSchedule,
    /// Default schedule of per-type flush jobs.
    pub default_flush: JobSchedule,

    expiry_minutes_by_type: HashMap<String, i64>,
    expiry_strategy_by_type: HashMap<String, ExpiryStrategy>,
    request_by_type: HashMap<String, JobSchedule>,
    flush_by_type: HashMap<String, JobSchedule>,
    ignored_dependencies: HashSet<(String, String)>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_expiry_minutes: DEFAULT_EXPIRY_MINUTES,
            default_expiry_strategy: ExpiryStrategy::Expire,
            expiry_check: JobSchedule::new(
                Duration::from_secs(DEFAULT_STARTUP_DELAY_SECS),
                Duration::from_secs(DEFAULT_EXPIRY_CHECK_PERIOD_SECS),
            ),
            default_request: JobSchedule::default(),
            default_flush: JobSchedule::default(),
            expiry_minutes_by_type: HashMap::new(),
            expiry_strategy_by_type: HashMap::new(),
            request_by_type: HashMap::new(),
            flush_by_type: HashMap::new(),
            ignored_dependencies: HashSet::new(),
        }
    }
}

impl CacheSettings {
    /// Build settings from environment variables, falling back to defaults.
    ///
    /// # Environment Variables
    /// - `TETHER_EXPIRY_MINUTES`: default expiry window in minutes (default: 120)
    /// - `TETHER_EXPIRY_STRATEGY`: `EXPIRE` or `REQUEST` (default: EXPIRE)
    /// - `TETHER_EXPIRY_CHECK_DELAY_SECS`: expiry job startup delay (default: 60)
    /// - `TETHER_EXPIRY_CHECK_PERIOD_SECS`: expiry job period (default: 3600)
    /// - `TETHER_REQUEST_DELAY_SECS` / `TETHER_REQUEST_PERIOD_SECS`: request job defaults (default: 60/60)
    /// - `TETHER_FLUSH_DELAY_SECS` / `TETHER_FLUSH_PERIOD_SECS`: flush job defaults (default: 60/60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        let default_expiry_strategy = std::env::var("TETHER_EXPIRY_STRATEGY")
            .ok()
            .and_then(|s| ExpiryStrategy::from_str(&s).ok())
            .unwrap_or(defaults.default_expiry_strategy);

        Self {
            default_expiry_minutes: std::env::var("TETHER_EXPIRY_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_expiry_minutes),
            default_expiry_strategy,
            expiry_check: JobSchedule::new(
                secs(
                    "TETHER_EXPIRY_CHECK_DELAY_SECS",
                    defaults.expiry_check.startup_delay,
                ),
                secs(
                    "TETHER_EXPIRY_CHECK_PERIOD_SECS",
                    defaults.expiry_check.period,
                ),
            ),
            default_request: JobSchedule::new(
                secs(
                    "TETHER_REQUEST_DELAY_SECS",
                    defaults.default_request.startup_delay,
                ),
                secs(
                    "TETHER_REQUEST_PERIOD_SECS",
                    defaults.default_request.period,
                ),
            ),
            default_flush: JobSchedule::new(
                secs(
                    "TETHER_FLUSH_DELAY_SECS",
                    defaults.default_flush.startup_delay,
                ),
                secs("TETHER_FLUSH_PERIOD_SECS", defaults.default_flush.period),
            ),
            ..defaults
        }
    }

    // === Per-type overrides ===

    pub fn with_expiry_minutes(mut self, type_name: impl Into<String>, minutes: i64) -> Self {
        self.expiry_minutes_by_type.insert(type_name.into(), minutes);
        self
    }

    pub fn with_expiry_strategy(
        mut self,
        type_name: impl Into<String>,
        strategy: ExpiryStrategy,
    ) -> Self {
        self.expiry_strategy_by_type
            .insert(type_name.into(), strategy);
        self
    }

    pub fn with_request_schedule(
        mut self,
        type_name: impl Into<String>,
        schedule: JobSchedule,
    ) -> Self {
        self.request_by_type.insert(type_name.into(), schedule);
        self
    }

    pub fn with_flush_schedule(
        mut self,
        type_name: impl Into<String>,
        schedule: JobSchedule,
    ) -> Self {
        self.flush_by_type.insert(type_name.into(), schedule);
        self
    }

    /// Drop the (source → target) dependency edge everywhere it occurs.
    pub fn with_ignored_dependency(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.ignored_dependencies
            .insert((source.into(), target.into()));
        self
    }

    // === Lookups: override, then the type's own declaration, then global ===

    pub fn expiry_minutes_for(&self, type_name: &str, declared: i64) -> i64 {
        if let Some(minutes) = self.expiry_minutes_by_type.get(type_name) {
            return *minutes;
        }
        if declared > 0 {
            declared
        } else {
            self.default_expiry_minutes
        }
    }

    pub fn expiry_strategy_for(
        &self,
        type_name: &str,
        declared: ExpiryStrategy,
    ) -> ExpiryStrategy {
        if let Some(strategy) = self.expiry_strategy_by_type.get(type_name) {
            return *strategy;
        }
        match declared {
            ExpiryStrategy::Unknown => self.default_expiry_strategy,
            known => known,
        }
    }

    pub fn request_schedule_for(&self, type_name: &str) -> JobSchedule {
        self.request_by_type
            .get(type_name)
            .copied()
            .unwrap_or(self.default_request)
    }

    pub fn flush_schedule_for(&self, type_name: &str) -> JobSchedule {
        self.flush_by_type
            .get(type_name)
            .copied()
            .unwrap_or(self.default_flush)
    }

    pub fn ignore_dependency(&self, source: &str, target: &str) -> bool {
        self.ignored_dependencies
            .contains(&(source.to_string(), target.to_string()))
    }

    /// Validate the settings. Fatal at startup when invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_expiry_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_expiry_minutes".to_string(),
                value: self.default_expiry_minutes.to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.default_expiry_strategy == ExpiryStrategy::Unknown {
            return Err(ConfigError::InvalidValue {
                field: "default_expiry_strategy".to_string(),
                value: self.default_expiry_strategy.to_string(),
                reason: "expected EXPIRE or REQUEST".to_string(),
            });
        }
        for (name, minutes) in &self.expiry_minutes_by_type {
            if *minutes <= 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("expiry_minutes.{name}"),
                    value: minutes.to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        for schedule in [&self.expiry_check, &self.default_request, &self.default_flush]
            .into_iter()
            .chain(self.request_by_type.values())
            .chain(self.flush_by_type.values())
        {
            if schedule.period.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "job period".to_string(),
                    value: "0".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

use chrono_tz::Tz;

use crate::limits::MAX_ENVELOPE_HOUR;

/// Hours outside business hours that are still offered as special requests.
pub const DEFAULT_ENVELOPE: (u32, u32) = (7, 22);
/// Extra credits charged per special hour.
pub const DEFAULT_SPECIAL_SURCHARGE: u32 = 1;
/// Confirmed reservations cancelled this close to their start pay a penalty.
pub const DEFAULT_LATE_CANCEL_HOURS: i64 = 24;
pub const DEFAULT_LATE_CANCEL_PENALTY: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "missing required setting {var}"),
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything the engine needs besides the data snapshot. There is no
/// default time zone: callers must name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub timezone: Tz,
    /// Extended operating envelope `[start, end)` in whole hours.
    pub envelope_start: u32,
    pub envelope_end: u32,
    pub special_surcharge: u32,
    pub late_cancel_hours: i64,
    pub late_cancel_penalty: u32,
}

impl EngineConfig {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            envelope_start: DEFAULT_ENVELOPE.0,
            envelope_end: DEFAULT_ENVELOPE.1,
            special_surcharge: DEFAULT_SPECIAL_SURCHARGE,
            late_cancel_hours: DEFAULT_LATE_CANCEL_HOURS,
            late_cancel_penalty: DEFAULT_LATE_CANCEL_PENALTY,
        }
    }

    pub fn with_envelope(mut self, start: u32, end: u32) -> Result<Self, ConfigError> {
        if start >= end || end > MAX_ENVELOPE_HOUR {
            return Err(ConfigError::Invalid {
                var: "envelope",
                value: format!("{start}..{end}"),
            });
        }
        self.envelope_start = start;
        self.envelope_end = end;
        Ok(self)
    }

    /// Hours of the extended envelope, in order.
    pub fn envelope(&self) -> std::ops::Range<u32> {
        self.envelope_start..self.envelope_end
    }

    /// Build from `HOURGRID_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading through `lookup` so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let tz_var = "HOURGRID_TIMEZONE";
        let tz_name = lookup(tz_var).ok_or(ConfigError::Missing(tz_var))?;
        let timezone: Tz = tz_name.parse().map_err(|_| ConfigError::Invalid {
            var: tz_var,
            value: tz_name.clone(),
        })?;

        let start = parsed(&lookup, "HOURGRID_ENVELOPE_START")?.unwrap_or(DEFAULT_ENVELOPE.0);
        let end = parsed(&lookup, "HOURGRID_ENVELOPE_END")?.unwrap_or(DEFAULT_ENVELOPE.1);
        let mut config = Self::new(timezone).with_envelope(start, end)?;

        if let Some(surcharge) = parsed(&lookup, "HOURGRID_SPECIAL_SURCHARGE")? {
            config.special_surcharge = surcharge;
        }
        if let Some(hours) = parsed(&lookup, "HOURGRID_LATE_CANCEL_HOURS")? {
            config.late_cancel_hours = hours;
        }
        if let Some(penalty) = parsed(&lookup, "HOURGRID_LATE_CANCEL_PENALTY")? {
            config.late_cancel_penalty = penalty;
        }
        Ok(config)
    }
}

fn parsed<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

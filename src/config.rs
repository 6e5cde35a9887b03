use std::path::Path;

use chrono::Weekday;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use crate::calendar::{build_calendar, CalendarKind, SolarCalendar};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Recency decay per elapsed month.
    pub decay_lambda: f64,
    pub outlier_z_threshold: f64,
    /// Logistic steepness of the after-peak decay.
    pub decay_steepness: f64,
    /// Hours past the peak bucket where the decay reaches one half.
    pub decay_offset_hours: f64,
    pub last_workday: Weekday,
    pub last_workday_modifier: f64,
    pub second_last_workday: Weekday,
    pub second_last_workday_modifier: f64,
    pub calendar: CalendarKind,
    pub timezone: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_lambda: 0.15,
            outlier_z_threshold: 2.0,
            decay_steepness: 0.6,
            decay_offset_hours: 2.0,
            last_workday: Weekday::Fri,
            last_workday_modifier: 0.05,
            second_last_workday: Weekday::Thu,
            second_last_workday_modifier: 0.6,
            calendar: CalendarKind::Jalali,
            timezone: "Asia/Tehran".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.decay_lambda.is_finite() || self.decay_lambda < 0.0 {
            return Err(ConfigError::Invalid("decay_lambda must be >= 0".into()));
        }
        if !self.outlier_z_threshold.is_finite() || self.outlier_z_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "outlier_z_threshold must be > 0".into(),
            ));
        }
        if !self.decay_steepness.is_finite() || self.decay_steepness <= 0.0 {
            return Err(ConfigError::Invalid("decay_steepness must be > 0".into()));
        }
        for (name, value) in [
            ("last_workday_modifier", self.last_workday_modifier),
            (
                "second_last_workday_modifier",
                self.second_last_workday_modifier,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within 0..=1")));
            }
        }
        if self.last_workday == self.second_last_workday {
            return Err(ConfigError::Invalid(
                "last_workday and second_last_workday must differ".into(),
            ));
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn calendar(&self) -> Result<Box<dyn SolarCalendar>, ConfigError> {
        Ok(build_calendar(self.calendar, self.tz()?))
    }

    pub fn weekday_modifier(&self, weekday: Weekday) -> f64 {
        if weekday == self.last_workday {
            self.last_workday_modifier
        } else if weekday == self.second_last_workday {
            self.second_last_workday_modifier
        } else {
            1.0
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::calendar::CalendarKind;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("no salary history to train on")]
    EmptyHistory,

    /// Outlier rejection removed every record. The record nearest the mean
    /// always has a z-score of at most 1, so this needs a threshold below 1.
    #[error("outlier rejection left no records (z-threshold {threshold})")]
    NoInliers { threshold: f64 },

    #[error("day {day} is outside 1..={days_in_month}")]
    InvalidDay { day: u32, days_in_month: u32 },

    #[error("record {id} is dated in the {found} calendar but {expected} is configured")]
    CalendarMismatch {
        id: Uuid,
        expected: CalendarKind,
        found: CalendarKind,
    },

    /// Every recency weight underflowed to zero, usually from a very large
    /// decay_lambda.
    #[error("recency weights sum to {total} (decay_lambda {lambda})")]
    ZeroWeight { total: f64, lambda: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown timezone {0:?}")]
    Timezone(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{CalendarKind, SolarCalendar};

/// One observed deposit. The solar date and clock time are derived once at
/// intake and never recomputed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRecord {
    pub id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub time: NaiveTime,
    /// Calendar that produced `year`, `month` and `day`.
    #[serde(default)]
    pub calendar: CalendarKind,
}

impl SalaryRecord {
    pub fn capture(paid_at: DateTime<Utc>, calendar: &dyn SolarCalendar) -> Self {
        let date = calendar.date_of(paid_at);
        Self {
            id: Uuid::new_v4(),
            paid_at,
            year: date.year,
            month: date.month,
            day: date.day,
            time: calendar.time_of(paid_at),
            calendar: calendar.kind(),
        }
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord {
    pub weight: f64,
    pub relative_day: i32,
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainedProfile {
    pub mean_relative_day: f64,
    pub std_dev_relative_day: f64,
    /// Summed recency weight keyed by 2-hour bucket start (0, 2, .., 22).
    pub hour_bucket_weights: BTreeMap<u32, f64>,
    pub peak_hour_bucket: u32,
    pub records_used: usize,
    pub records_rejected: usize,
}

impl TrainedProfile {
    pub fn bucket_weight(&self, bucket: u32) -> f64 {
        self.hour_bucket_weights.get(&bucket).copied().unwrap_or(0.0)
    }

    pub fn max_bucket_weight(&self) -> f64 {
        self.hour_bucket_weights.values().copied().fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub probability_percent: f64,
    pub base_day_chance: f64,
    pub day_of_week_modifier: f64,
    pub time_window_modifier: f64,
    pub intra_day_decay: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeakDay {
    pub day: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayPeriod {
    Morning,
    Noon,
    Evening,
    LateNight,
}

impl DayPeriod {
    pub fn from_start_hour(hour: u32) -> Self {
        match hour {
            5..=11 => DayPeriod::Morning,
            12..=15 => DayPeriod::Noon,
            16..=19 => DayPeriod::Evening,
            _ => DayPeriod::LateNight,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayPeriod::Morning => "morning",
            DayPeriod::Noon => "noon",
            DayPeriod::Evening => "evening",
            DayPeriod::LateNight => "late-night",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeakTimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub count: usize,
    pub period: DayPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stability {
    Excellent,
    Stable,
    Variable,
    InsufficientData,
}

impl Stability {
    pub fn label(&self) -> &'static str {
        match self {
            Stability::Excellent => "excellent",
            Stability::Stable => "stable",
            Stability::Variable => "variable",
            Stability::InsufficientData => "insufficient data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusiestMonth {
    pub month: u32,
    pub name: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindowCount {
    pub start_hour: u32,
    pub end_hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub year: Option<i32>,
    pub total: usize,
    pub peak_day: Option<PeakDay>,
    pub peak_time: Option<PeakTimeWindow>,
    pub stability: Stability,
    pub busiest_month: Option<BusiestMonth>,
    pub day_histogram: Vec<usize>,
    pub time_histogram: Vec<TimeWindowCount>,
}

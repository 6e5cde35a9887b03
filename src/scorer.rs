use chrono::{DateTime, Timelike, Utc};
use tracing::debug;

use crate::calendar::SolarCalendar;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{PredictionResult, SalaryRecord, TrainedProfile};
use crate::relative_day;
use crate::trainer::{self, hour_bucket};

/// Floor of the time-window modifier for hours nobody has been paid in.
const TIME_WINDOW_FLOOR: f64 = 0.2;

pub fn base_day_chance(target_relative_day: i32, profile: &TrainedProfile) -> f64 {
    let spread = profile.std_dev_relative_day.max(1.0);
    let distance = f64::from(target_relative_day) - profile.mean_relative_day;
    (-distance.powi(2) / (2.0 * spread.powi(2))).exp()
}

pub fn time_window_modifier(profile: &TrainedProfile, hour: u32) -> f64 {
    let max_weight = profile.max_bucket_weight();
    if max_weight <= 0.0 {
        return 1.0;
    }
    let ratio = profile.bucket_weight(hour_bucket(hour)) / max_weight;
    TIME_WINDOW_FLOOR + (1.0 - TIME_WINDOW_FLOOR) * ratio
}

/// Stays at 1 up to the peak bucket start, then falls off logistically.
pub fn intra_day_decay(hour: u32, peak_hour_bucket: u32, config: &EngineConfig) -> f64 {
    if hour <= peak_hour_bucket {
        return 1.0;
    }
    let hours_past_peak = f64::from(hour - peak_hour_bucket);
    1.0 - sigmoid(config.decay_steepness * (hours_past_peak - config.decay_offset_hours))
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

pub fn score(
    profile: &TrainedProfile,
    target: DateTime<Utc>,
    calendar: &dyn SolarCalendar,
    config: &EngineConfig,
) -> PredictionResult {
    let date = calendar.date_of(target);
    let hour = calendar.time_of(target).hour();

    let base = unit(base_day_chance(
        relative_day::normalize(date.day, date.days_in_month),
        profile,
    ));
    let weekday = unit(config.weekday_modifier(date.weekday));
    let window = unit(time_window_modifier(profile, hour));
    let decay = unit(intra_day_decay(hour, profile.peak_hour_bucket, config));

    let probability = (base * weekday * window * decay * 100.0).clamp(0.0, 100.0);

    debug!(
        base,
        weekday, window, decay, probability, "scored target moment"
    );

    PredictionResult {
        probability_percent: round_to(probability, 2),
        base_day_chance: round_to(base, 4),
        day_of_week_modifier: round_to(weekday, 4),
        time_window_modifier: round_to(window, 4),
        intra_day_decay: round_to(decay, 4),
    }
}

/// Trains on the full history and scores `target`. Empty history yields
/// `None` instead of an error.
pub fn predict(
    history: &[SalaryRecord],
    now: DateTime<Utc>,
    target: DateTime<Utc>,
    calendar: &dyn SolarCalendar,
    config: &EngineConfig,
) -> Result<Option<PredictionResult>, EngineError> {
    match trainer::train(history, now, calendar, config) {
        Ok(profile) => Ok(Some(score(&profile, target, calendar, config))),
        Err(EngineError::EmptyHistory) => Ok(None),
        Err(err) => Err(err),
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::debug;

use crate::calendar::{CalendarKind, SolarCalendar, SolarDate};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{DerivedRecord, SalaryRecord, TrainedProfile};
use crate::relative_day;

/// Width of the hour buckets the profile aggregates deposit times into.
pub const HOUR_BUCKET_WIDTH: u32 = 2;

pub fn hour_bucket(hour: u32) -> u32 {
    hour / HOUR_BUCKET_WIDTH * HOUR_BUCKET_WIDTH
}

/// Whole solar months between the record and `now`, floored at zero.
///
/// A month only counts once its anniversary (day and clock time) has been
/// reached; the anniversary day is clamped to the length of `now`'s month.
pub fn months_elapsed(now: &SolarDate, now_time: NaiveTime, record: &SalaryRecord) -> u32 {
    let months = (now.year * 12 + now.month as i32) - (record.year * 12 + record.month as i32);
    if months <= 0 {
        return 0;
    }

    let anniversary_day = record.day.min(now.days_in_month);
    let anniversary_reached =
        (now.day, now_time) >= (anniversary_day, record.time);

    if anniversary_reached {
        months as u32
    } else {
        (months - 1) as u32
    }
}

pub fn recency_weight(months_elapsed: u32, lambda: f64) -> f64 {
    (-lambda * f64::from(months_elapsed)).exp()
}

pub fn derive(
    record: &SalaryRecord,
    now: &SolarDate,
    now_time: NaiveTime,
    calendar: &dyn SolarCalendar,
    config: &EngineConfig,
) -> Result<DerivedRecord, EngineError> {
    let days_in_month = calendar.days_in_month(record.year, record.month);
    Ok(DerivedRecord {
        weight: recency_weight(months_elapsed(now, now_time, record), config.decay_lambda),
        relative_day: relative_day::try_normalize(record.day, days_in_month)?,
        hour: record.hour(),
    })
}

/// Weighted mean and population standard deviation of the relative day.
/// `train` checks that the total weight is positive before calling this.
fn weighted_moments(records: &[DerivedRecord]) -> (f64, f64) {
    let total_weight: f64 = records.iter().map(|r| r.weight).sum();
    let mean = records
        .iter()
        .map(|r| f64::from(r.relative_day) * r.weight)
        .sum::<f64>()
        / total_weight;
    let variance = records
        .iter()
        .map(|r| r.weight * (f64::from(r.relative_day) - mean).powi(2))
        .sum::<f64>()
        / total_weight;
    (mean, variance.sqrt())
}

const DEGENERATE_STD_DEV: f64 = 1e-9;

/// Zero deviation is replaced by 1 wherever it is used as a divisor.
pub fn smoothed_std_dev(std_dev: f64) -> f64 {
    if std_dev > DEGENERATE_STD_DEV {
        std_dev
    } else {
        1.0
    }
}

fn reject_outliers(records: Vec<DerivedRecord>, threshold: f64) -> (Vec<DerivedRecord>, usize) {
    let (mean, std_dev) = weighted_moments(&records);
    let divisor = smoothed_std_dev(std_dev);
    let before = records.len();

    let kept: Vec<DerivedRecord> = records
        .into_iter()
        .filter(|r| (f64::from(r.relative_day) - mean).abs() / divisor <= threshold)
        .collect();

    let rejected = before - kept.len();
    (kept, rejected)
}

/// Fails on the first record dated in a different calendar than `expected`.
pub fn ensure_calendar(
    history: &[SalaryRecord],
    expected: CalendarKind,
) -> Result<(), EngineError> {
    match history.iter().find(|r| r.calendar != expected) {
        Some(record) => Err(EngineError::CalendarMismatch {
            id: record.id,
            expected,
            found: record.calendar,
        }),
        None => Ok(()),
    }
}

pub fn train(
    history: &[SalaryRecord],
    now: DateTime<Utc>,
    calendar: &dyn SolarCalendar,
    config: &EngineConfig,
) -> Result<TrainedProfile, EngineError> {
    if history.is_empty() {
        return Err(EngineError::EmptyHistory);
    }
    ensure_calendar(history, calendar.kind())?;

    let now_date = calendar.date_of(now);
    let now_time = calendar.time_of(now);
    let derived = history
        .iter()
        .map(|record| derive(record, &now_date, now_time, calendar, config))
        .collect::<Result<Vec<_>, _>>()?;

    let total_weight: f64 = derived.iter().map(|r| r.weight).sum();
    if !total_weight.is_finite() || total_weight <= 0.0 {
        return Err(EngineError::ZeroWeight {
            total: total_weight,
            lambda: config.decay_lambda,
        });
    }

    let (kept, rejected) = reject_outliers(derived, config.outlier_z_threshold);
    if kept.is_empty() {
        return Err(EngineError::NoInliers {
            threshold: config.outlier_z_threshold,
        });
    }
    if rejected > 0 {
        debug!(rejected, kept = kept.len(), "dropped outlier deposits");
    }

    let (mean_relative_day, std_dev_relative_day) = weighted_moments(&kept);

    let mut hour_bucket_weights: BTreeMap<u32, f64> = BTreeMap::new();
    for record in &kept {
        *hour_bucket_weights
            .entry(hour_bucket(record.hour))
            .or_insert(0.0) += record.weight;
    }

    // Ascending bucket order with a strict comparison: the earliest bucket
    // wins ties.
    let mut peak_hour_bucket = 0;
    let mut peak_weight = f64::NEG_INFINITY;
    for (&bucket, &weight) in &hour_bucket_weights {
        if weight > peak_weight {
            peak_weight = weight;
            peak_hour_bucket = bucket;
        }
    }

    debug!(
        mean_relative_day,
        std_dev_relative_day, peak_hour_bucket, "trained deposit profile"
    );

    Ok(TrainedProfile {
        mean_relative_day,
        std_dev_relative_day,
        hour_bucket_weights,
        peak_hour_bucket,
        records_used: kept.len(),
        records_rejected: rejected,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::calendar::{GregorianCalendar, JalaliCalendar};
    use chrono::{TimeZone, Weekday};
    use uuid::Uuid;

    pub(crate) fn calendar() -> JalaliCalendar {
        JalaliCalendar::new(chrono_tz::UTC)
    }

    pub(crate) fn record(year: i32, month: u32, day: u32, hour: u32) -> SalaryRecord {
        SalaryRecord {
            id: Uuid::new_v4(),
            paid_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            year,
            month,
            day,
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            calendar: CalendarKind::Jalali,
        }
    }

    /// Day 25 at 14:00 for every month of 1403.
    pub(crate) fn twelve_months_on_the_25th() -> Vec<SalaryRecord> {
        (1..=12).map(|month| record(1403, month, 25, 14)).collect()
    }

    fn solar(year: i32, month: u32, day: u32, days_in_month: u32) -> SolarDate {
        SolarDate {
            year,
            month,
            day,
            weekday: Weekday::Mon,
            days_in_month,
        }
    }

    #[test]
    fn months_elapsed_counts_whole_months_only() {
        let now = solar(1404, 1, 25, 31);
        let now_time = NaiveTime::from_hms_opt(14, 30, 0).unwrap();

        assert_eq!(months_elapsed(&now, now_time, &record(1403, 12, 25, 14)), 1);
        assert_eq!(months_elapsed(&now, now_time, &record(1403, 12, 26, 9)), 0);
        assert_eq!(months_elapsed(&now, now_time, &record(1403, 12, 25, 15)), 0);
        assert_eq!(months_elapsed(&now, now_time, &record(1403, 1, 25, 14)), 12);
        assert_eq!(months_elapsed(&now, now_time, &record(1404, 1, 2, 8)), 0);
    }

    #[test]
    fn future_records_get_full_weight() {
        let now = solar(1404, 1, 25, 31);
        let now_time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let future = record(1404, 3, 1, 10);
        assert_eq!(months_elapsed(&now, now_time, &future), 0);
        assert_eq!(recency_weight(0, 0.15), 1.0);
    }

    #[test]
    fn anniversary_day_is_clamped_to_short_months() {
        let now = solar(1404, 7, 30, 30);
        let now_time = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        assert_eq!(months_elapsed(&now, now_time, &record(1404, 6, 31, 10)), 1);
    }

    #[test]
    fn recency_weight_is_monotonic() {
        let mut previous = recency_weight(0, 0.15);
        for months in 1..36 {
            let weight = recency_weight(months, 0.15);
            assert!(weight <= previous);
            assert!(weight > 0.0);
            previous = weight;
        }
        assert!((recency_weight(1, 0.15) - (-0.15f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn newer_record_outweighs_older_twin() {
        let cal = calendar();
        let config = EngineConfig::default();
        let now = solar(1404, 1, 25, 31);
        let now_time = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let newer = derive(&record(1403, 11, 25, 10), &now, now_time, &cal, &config).unwrap();
        let older = derive(&record(1402, 11, 25, 10), &now, now_time, &cal, &config).unwrap();
        assert!(newer.weight >= older.weight);
        assert_eq!(newer.relative_day, older.relative_day);
    }

    #[test]
    fn empty_history_has_no_profile() {
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 12, 0, 0).unwrap();
        let result = train(&[], now, &calendar(), &EngineConfig::default());
        assert_eq!(result, Err(EngineError::EmptyHistory));
    }

    #[test]
    fn twelve_months_on_the_25th_learn_the_afternoon_peak() {
        // 1404/08/25 14:30
        let now = Utc.with_ymd_and_hms(2025, 11, 16, 14, 30, 0).unwrap();
        let profile = train(
            &twelve_months_on_the_25th(),
            now,
            &calendar(),
            &EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(profile.peak_hour_bucket, 14);
        assert_eq!(profile.records_used, 12);
        assert_eq!(profile.records_rejected, 0);
        assert!(profile.std_dev_relative_day < 1.0);
        assert!(profile.mean_relative_day > -6.0 && profile.mean_relative_day < -5.0);
        assert_eq!(profile.hour_bucket_weights.len(), 1);
    }

    #[test]
    fn identical_relative_days_have_zero_deviation() {
        let history: Vec<SalaryRecord> = (1..=6)
            .flat_map(|month| [record(1402, month, 25, 14), record(1403, month, 25, 14)])
            .collect();
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 14, 30, 0).unwrap();

        let profile = train(&history, now, &calendar(), &EngineConfig::default()).unwrap();
        assert!((profile.mean_relative_day + 6.0).abs() < 1e-9);
        assert!(profile.std_dev_relative_day < 1e-9);
        assert_eq!(smoothed_std_dev(profile.std_dev_relative_day), 1.0);
    }

    #[test]
    fn one_off_deposit_is_rejected_as_outlier() {
        let mut history: Vec<SalaryRecord> =
            (1..=6).map(|month| record(1403, month, 28, 10)).collect();
        history.push(record(1403, 3, 10, 10));
        let now = Utc.with_ymd_and_hms(2024, 9, 22, 12, 0, 0).unwrap();

        let profile = train(&history, now, &calendar(), &EngineConfig::default()).unwrap();
        assert_eq!(profile.records_rejected, 1);
        assert_eq!(profile.records_used, 6);
        assert!((profile.mean_relative_day + 3.0).abs() < 1e-9);
    }

    #[test]
    fn outlier_rejection_does_not_keep_shrinking() {
        let history = vec![
            record(1403, 1, 29, 10),
            record(1403, 2, 30, 10),
            record(1403, 3, 30, 10),
            record(1403, 4, 29, 10),
            record(1403, 5, 30, 10),
            record(1403, 6, 30, 10),
            record(1403, 6, 29, 10),
            record(1403, 2, 12, 10),
        ];
        let cal = calendar();
        let config = EngineConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 9, 22, 12, 0, 0).unwrap();
        let now_date = cal.date_of(now);
        let now_time = cal.time_of(now);

        let derived: Vec<DerivedRecord> = history
            .iter()
            .map(|r| derive(r, &now_date, now_time, &cal, &config).unwrap())
            .collect();
        let (first_pass, first_rejected) = reject_outliers(derived, config.outlier_z_threshold);
        let (second_pass, second_rejected) =
            reject_outliers(first_pass.clone(), config.outlier_z_threshold);

        assert_eq!(first_rejected, 1);
        assert_eq!(second_rejected, 0);
        assert_eq!(second_pass, first_pass);
    }

    #[test]
    fn bucket_ties_go_to_the_earliest_bucket() {
        let history = vec![record(1403, 6, 30, 16), record(1403, 6, 30, 9)];
        let now = Utc.with_ymd_and_hms(2024, 9, 22, 12, 0, 0).unwrap();

        let profile = train(&history, now, &calendar(), &EngineConfig::default()).unwrap();
        assert_eq!(profile.peak_hour_bucket, 8);
        assert_eq!(profile.bucket_weight(8), profile.bucket_weight(16));
    }

    #[test]
    fn invalid_stored_day_fails_fast() {
        let history = vec![record(1404, 12, 30, 10)];
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 12, 0, 0).unwrap();
        let result = train(&history, now, &calendar(), &EngineConfig::default());
        assert_eq!(
            result,
            Err(EngineError::InvalidDay {
                day: 30,
                days_in_month: 29
            })
        );
    }

    #[test]
    fn records_from_another_calendar_are_rejected() {
        // 1404/01/31 in Tehran
        let paid_at = Utc.with_ymd_and_hms(2025, 4, 20, 10, 0, 0).unwrap();
        let jalali = SalaryRecord::capture(paid_at, &JalaliCalendar::new(chrono_tz::Asia::Tehran));
        let gregorian = GregorianCalendar::new(chrono_tz::Asia::Tehran);
        let now = Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap();

        let result = train(&[jalali.clone()], now, &gregorian, &EngineConfig::default());
        assert_eq!(
            result,
            Err(EngineError::CalendarMismatch {
                id: jalali.id,
                expected: CalendarKind::Gregorian,
                found: CalendarKind::Jalali,
            })
        );

        let native = SalaryRecord::capture(paid_at, &gregorian);
        let mixed = vec![native.clone(), jalali];
        assert!(matches!(
            train(&mixed, now, &gregorian, &EngineConfig::default()),
            Err(EngineError::CalendarMismatch { .. })
        ));
        assert!(train(&[native], now, &gregorian, &EngineConfig::default()).is_ok());
    }

    #[test]
    fn underflowing_weights_are_reported() {
        let history = vec![record(1390, 1, 25, 10), record(1390, 2, 25, 10)];
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 12, 0, 0).unwrap();
        let config = EngineConfig {
            decay_lambda: 100.0,
            ..EngineConfig::default()
        };

        let result = train(&history, now, &calendar(), &config);
        assert_eq!(
            result,
            Err(EngineError::ZeroWeight {
                total: 0.0,
                lambda: 100.0
            })
        );
    }

    #[test]
    fn hour_buckets_are_two_hours_wide() {
        assert_eq!(hour_bucket(0), 0);
        assert_eq!(hour_bucket(1), 0);
        assert_eq!(hour_bucket(14), 14);
        assert_eq!(hour_bucket(15), 14);
        assert_eq!(hour_bucket(23), 22);
    }
}

use std::collections::BTreeMap;

use crate::calendar::SolarCalendar;
use crate::error::EngineError;
use crate::models::{
    BusiestMonth, DayPeriod, HistorySummary, PeakDay, PeakTimeWindow, SalaryRecord, Stability,
    TimeWindowCount,
};
use crate::trainer;

pub const TIME_WINDOW_HOURS: u32 = 4;
const TIME_WINDOW_COUNT: usize = (24 / TIME_WINDOW_HOURS) as usize;
const MAX_MONTH_DAYS: usize = 31;

pub fn filter_by_year(history: &[SalaryRecord], year: Option<i32>) -> Vec<SalaryRecord> {
    match year {
        Some(year) => history.iter().filter(|r| r.year == year).cloned().collect(),
        None => history.to_vec(),
    }
}

// Ties resolve to the lowest key.
fn most_frequent<K: Ord + Copy>(keys: impl Iterator<Item = K>) -> Option<(K, usize)> {
    let mut counts: BTreeMap<K, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut best: Option<(K, usize)> = None;
    for (key, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((key, count));
        }
    }
    best
}

pub fn peak_day(history: &[SalaryRecord]) -> Option<PeakDay> {
    most_frequent(history.iter().map(|r| r.day)).map(|(day, count)| PeakDay { day, count })
}

pub fn time_histogram(history: &[SalaryRecord]) -> Vec<TimeWindowCount> {
    let mut counts = [0usize; TIME_WINDOW_COUNT];
    for record in history {
        counts[(record.hour() / TIME_WINDOW_HOURS) as usize] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(idx, &count)| {
            let start_hour = idx as u32 * TIME_WINDOW_HOURS;
            TimeWindowCount {
                start_hour,
                end_hour: (start_hour + TIME_WINDOW_HOURS) % 24,
                count,
            }
        })
        .collect()
}

pub fn peak_time_window(history: &[SalaryRecord]) -> Option<PeakTimeWindow> {
    if history.is_empty() {
        return None;
    }

    let mut peak: Option<TimeWindowCount> = None;
    for window in time_histogram(history) {
        if peak.as_ref().map_or(true, |p| window.count > p.count) {
            peak = Some(window);
        }
    }

    peak.map(|window| PeakTimeWindow {
        start_hour: window.start_hour,
        end_hour: window.end_hour,
        count: window.count,
        period: DayPeriod::from_start_hour(window.start_hour),
    })
}

pub fn day_histogram(history: &[SalaryRecord]) -> Vec<usize> {
    let mut counts = vec![0usize; MAX_MONTH_DAYS];
    for record in history {
        if let Some(slot) = (record.day as usize)
            .checked_sub(1)
            .and_then(|idx| counts.get_mut(idx))
        {
            *slot += 1;
        }
    }
    counts
}

/// Population standard deviation of the raw day-of-month values.
pub fn day_std_dev(history: &[SalaryRecord]) -> Option<f64> {
    if history.len() < 2 {
        return None;
    }
    let n = history.len() as f64;
    let mean = history.iter().map(|r| f64::from(r.day)).sum::<f64>() / n;
    let variance = history
        .iter()
        .map(|r| (f64::from(r.day) - mean).powi(2))
        .sum::<f64>()
        / n;
    Some(variance.sqrt())
}

pub fn stability(history: &[SalaryRecord]) -> Stability {
    match day_std_dev(history) {
        None => Stability::InsufficientData,
        Some(std_dev) if std_dev < 1.5 => Stability::Excellent,
        Some(std_dev) if std_dev < 4.0 => Stability::Stable,
        Some(_) => Stability::Variable,
    }
}

pub fn busiest_month(
    history: &[SalaryRecord],
    calendar: &dyn SolarCalendar,
) -> Option<BusiestMonth> {
    most_frequent(history.iter().map(|r| r.month)).map(|(month, count)| BusiestMonth {
        month,
        name: calendar.month_name(month),
        count,
    })
}

pub fn summarize(
    history: &[SalaryRecord],
    year: Option<i32>,
    calendar: &dyn SolarCalendar,
) -> Result<HistorySummary, EngineError> {
    trainer::ensure_calendar(history, calendar.kind())?;
    let records = filter_by_year(history, year);
    Ok(HistorySummary {
        year,
        total: records.len(),
        peak_day: peak_day(&records),
        peak_time: peak_time_window(&records),
        stability: stability(&records),
        busiest_month: busiest_month(&records, calendar),
        day_histogram: day_histogram(&records),
        time_histogram: time_histogram(&records),
    })
}

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{HistorySummary, PredictionResult};

fn bar(count: usize, max: usize) -> String {
    const WIDTH: usize = 20;
    if max == 0 {
        return String::new();
    }
    "#".repeat((count * WIDTH).div_ceil(max))
}

pub fn write_prediction(output: &mut String, target: DateTime<Utc>, prediction: &PredictionResult) {
    let _ = writeln!(
        output,
        "Chance of a deposit at {}: {:.2}%",
        target.to_rfc3339(),
        prediction.probability_percent
    );
    let _ = writeln!(output, "- day match: {:.4}", prediction.base_day_chance);
    let _ = writeln!(output, "- weekday: {:.4}", prediction.day_of_week_modifier);
    let _ = writeln!(output, "- time window: {:.4}", prediction.time_window_modifier);
    let _ = writeln!(output, "- same-day decay: {:.4}", prediction.intra_day_decay);
}

pub fn write_summary(output: &mut String, summary: &HistorySummary) {
    let _ = writeln!(output, "Deposits recorded: {}", summary.total);

    match &summary.peak_day {
        Some(peak) => {
            let _ = writeln!(
                output,
                "Usual pay day: day {} ({} times)",
                peak.day, peak.count
            );
        }
        None => {
            let _ = writeln!(output, "Usual pay day: no data");
        }
    }

    match &summary.peak_time {
        Some(peak) => {
            let _ = writeln!(
                output,
                "Usual time: {} ({:02}:00-{:02}:00, {} deposits)",
                peak.period.label(),
                peak.start_hour,
                peak.end_hour,
                peak.count
            );
        }
        None => {
            let _ = writeln!(output, "Usual time: no data to analyse");
        }
    }

    if let Some(month) = &summary.busiest_month {
        let _ = writeln!(
            output,
            "Busiest month: {} ({} deposits)",
            month.name, month.count
        );
    }

    let _ = writeln!(output, "Stability: {}", summary.stability.label());
}

pub fn build_report(
    summary: &HistorySummary,
    target: DateTime<Utc>,
    prediction: Option<&PredictionResult>,
) -> String {
    let mut output = String::new();
    let scope = summary
        .year
        .map(|year| format!("year {year}"))
        .unwrap_or_else(|| "all years".to_string());

    let _ = writeln!(output, "# Salary Deposit Report");
    let _ = writeln!(output, "Generated for {scope} at {}", target.to_rfc3339());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output);
    write_summary(&mut output, summary);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Deposits by Day of Month");
    let _ = writeln!(output);

    if summary.total == 0 {
        let _ = writeln!(output, "No deposits recorded for this period.");
    } else {
        let max = summary.day_histogram.iter().copied().max().unwrap_or(0);
        let _ = writeln!(output, "```");
        for (idx, &count) in summary.day_histogram.iter().enumerate() {
            if count > 0 {
                let _ = writeln!(output, "{:>2} | {:<20} {}", idx + 1, bar(count, max), count);
            }
        }
        let _ = writeln!(output, "```");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Deposits by Time of Day");
    let _ = writeln!(output);

    if summary.total == 0 {
        let _ = writeln!(output, "No deposits recorded for this period.");
    } else {
        let max = summary.time_histogram.iter().map(|w| w.count).max().unwrap_or(0);
        let _ = writeln!(output, "```");
        for window in &summary.time_histogram {
            let _ = writeln!(
                output,
                "{:02}-{:02} | {:<20} {}",
                window.start_hour,
                window.end_hour,
                bar(window.count, max),
                window.count
            );
        }
        let _ = writeln!(output, "```");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Prediction");
    let _ = writeln!(output);

    match prediction {
        Some(prediction) => write_prediction(&mut output, target, prediction),
        None => {
            let _ = writeln!(output, "Not enough history to predict a deposit.");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;
    use crate::trainer::tests::{calendar, record};
    use chrono::TimeZone;

    #[test]
    fn report_lists_sections_and_prediction() {
        let history = vec![
            record(1403, 1, 30, 9),
            record(1403, 2, 30, 10),
            record(1403, 3, 29, 17),
        ];
        let summary = stats::summarize(&history, Some(1403), &calendar()).unwrap();
        let prediction = PredictionResult {
            probability_percent: 42.5,
            base_day_chance: 0.9,
            day_of_week_modifier: 1.0,
            time_window_modifier: 0.6,
            intra_day_decay: 0.787,
        };
        let target = Utc.with_ymd_and_hms(2025, 4, 14, 10, 0, 0).unwrap();

        let report = build_report(&summary, target, Some(&prediction));
        assert!(report.contains("# Salary Deposit Report"));
        assert!(report.contains("Generated for year 1403"));
        assert!(report.contains("Usual pay day: day 30 (2 times)"));
        assert!(report.contains("Usual time: morning (08:00-12:00, 2 deposits)"));
        assert!(report.contains("Busiest month: Farvardin"));
        assert!(report.contains("Stability: excellent"));
        assert!(report.contains("30 | ####################"));
        assert!(report.contains("42.50%"));
    }

    #[test]
    fn empty_report_says_so() {
        let summary = stats::summarize(&[], None, &calendar()).unwrap();
        let target = Utc.with_ymd_and_hms(2025, 4, 14, 10, 0, 0).unwrap();

        let report = build_report(&summary, target, None);
        assert!(report.contains("Generated for all years"));
        assert!(report.contains("Usual pay day: no data"));
        assert!(report.contains("Stability: insufficient data"));
        assert!(report.contains("No deposits recorded for this period."));
        assert!(report.contains("Not enough history to predict a deposit."));
    }
}

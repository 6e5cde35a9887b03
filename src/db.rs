use anyhow::Context;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::{CalendarKind, SolarCalendar};
use crate::history;
use crate::models::SalaryRecord;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Appends one deposit. Returns false when `source_key` was already stored.
pub async fn insert_record(
    pool: &PgPool,
    record: &SalaryRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO salary_pulse.salaries
        (id, paid_at, solar_year, solar_month, solar_day, paid_time, calendar, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(record.paid_at)
    .bind(record.year)
    .bind(i32::try_from(record.month)?)
    .bind(i32::try_from(record.day)?)
    .bind(record.time)
    .bind(record.calendar.as_str())
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_history(pool: &PgPool, year: Option<i32>) -> anyhow::Result<Vec<SalaryRecord>> {
    let mut query = String::from(
        "SELECT id, paid_at, solar_year, solar_month, solar_day, paid_time, calendar \
         FROM salary_pulse.salaries",
    );
    if year.is_some() {
        query.push_str(" WHERE solar_year = $1");
    }
    query.push_str(" ORDER BY paid_at");

    let mut rows = sqlx::query(&query);
    if let Some(value) = year {
        rows = rows.bind(value);
    }

    let rows = rows.fetch_all(pool).await?;
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let month: i32 = row.get("solar_month");
        let day: i32 = row.get("solar_day");
        let calendar: String = row.get("calendar");
        records.push(SalaryRecord {
            id: row.get::<Uuid, _>("id"),
            paid_at: row.get::<DateTime<Utc>, _>("paid_at"),
            year: row.get("solar_year"),
            month: u32::try_from(month).context("negative solar_month in store")?,
            day: u32::try_from(day).context("negative solar_day in store")?,
            time: row.get::<NaiveTime, _>("paid_time"),
            calendar: CalendarKind::parse(&calendar)
                .with_context(|| format!("unknown calendar {calendar:?} in store"))?,
        });
    }

    debug!(count = records.len(), ?year, "fetched salary history");
    Ok(records)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    calendar: &dyn SolarCalendar,
) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for row in history::read_deposits(csv_path)? {
        let record = SalaryRecord::capture(row.paid_at, calendar);
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", row.paid_at.to_rfc3339()));

        if insert_record(pool, &record, &source_key).await? {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "imported deposits");
    Ok(inserted)
}

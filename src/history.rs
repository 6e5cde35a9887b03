use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::models::SalaryRecord;

/// A deposit as supplied for bulk import: only the timestamp is required.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositRow {
    pub paid_at: DateTime<Utc>,
    pub source_key: Option<String>,
}

pub fn load_history(path: &Path) -> anyhow::Result<Vec<SalaryRecord>> {
    if !path.exists() {
        anyhow::bail!(
            "history file {} not found; record a deposit with --csv to create it",
            path.display()
        );
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open history {}", path.display()))?;
    let mut records = Vec::new();

    for (line, result) in reader.deserialize::<SalaryRecord>().enumerate() {
        let record =
            result.with_context(|| format!("bad history row {} in {}", line + 1, path.display()))?;
        records.push(record);
    }

    debug!(path = %path.display(), count = records.len(), "loaded history");
    Ok(records)
}

pub fn append_record(path: &Path, record: &SalaryRecord) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open history {}", path.display()))?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

pub fn read_deposits(path: &Path) -> anyhow::Result<Vec<DepositRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<DepositRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

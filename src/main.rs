use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod calendar;
mod config;
mod db;
mod error;
mod history;
mod models;
mod relative_day;
mod report;
mod scorer;
mod stats;
mod trainer;

use config::EngineConfig;
use models::SalaryRecord;

#[derive(Parser)]
#[command(name = "salary-pulse")]
#[command(about = "Tracks salary deposits and estimates the chance one lands now", long_about = None)]
struct Cli {
    /// Engine config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Record a deposit (defaults to now)
    Record {
        /// RFC 3339 timestamp of the deposit
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Append to a CSV history file instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Import deposits from a CSV file with a paid_at column
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Estimate the chance of a deposit at a moment (defaults to now)
    Predict {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Summarise deposit days and times
    Stats {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let database_url = database_url
        .context("DATABASE_URL must be set, or pass --csv to use a history file")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_history(
    csv: Option<&Path>,
    database_url: Option<&str>,
    year: Option<i32>,
) -> anyhow::Result<Vec<SalaryRecord>> {
    match csv {
        Some(path) => Ok(stats::filter_by_year(&history::load_history(path)?, year)),
        None => {
            let pool = connect(database_url).await?;
            db::fetch_history(&pool, year).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    let calendar = config.calendar()?;
    let database_url = cli.database_url.as_deref();
    let now = Utc::now();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(database_url).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Record { at, csv } => {
            let paid_at = at.unwrap_or(now);
            let record = SalaryRecord::capture(paid_at, calendar.as_ref());
            match csv {
                Some(path) => history::append_record(&path, &record)?,
                None => {
                    let pool = connect(database_url).await?;
                    let source_key = format!("manual-{}", record.id);
                    db::insert_record(&pool, &record, &source_key).await?;
                }
            }
            println!(
                "Recorded deposit on {}/{:02}/{:02} at {}.",
                record.year, record.month, record.day, record.time
            );
        }
        Commands::Import { csv } => {
            let pool = connect(database_url).await?;
            let inserted = db::import_csv(&pool, &csv, calendar.as_ref()).await?;
            println!("Inserted {inserted} deposits from {}.", csv.display());
        }
        Commands::Predict { at, csv, json } => {
            let target = at.unwrap_or(now);
            let history = load_history(csv.as_deref(), database_url, None).await?;
            let prediction =
                scorer::predict(&history, now, target, calendar.as_ref(), &config)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
                return Ok(());
            }

            match prediction {
                Some(prediction) => {
                    let mut output = String::new();
                    report::write_prediction(&mut output, target, &prediction);
                    print!("{output}");
                }
                None => println!("No deposits recorded yet; nothing to predict."),
            }
        }
        Commands::Stats { year, csv, json } => {
            let history = load_history(csv.as_deref(), database_url, year).await?;
            let summary = stats::summarize(&history, year, calendar.as_ref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let mut output = String::new();
                report::write_summary(&mut output, &summary);
                print!("{output}");
            }
        }
        Commands::Report { year, csv, out } => {
            let history = load_history(csv.as_deref(), database_url, None).await?;
            let summary = stats::summarize(&history, year, calendar.as_ref())?;
            let prediction =
                scorer::predict(&history, now, now, calendar.as_ref(), &config)?;
            let report = report::build_report(&summary, now, prediction.as_ref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

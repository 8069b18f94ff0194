use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use firewatch_core::config::{resolve_config, CoordinatorConfig};
use firewatch_core::coordinator::{run_dispatch, DispatchOutcome, SqliteStore};
use firewatch_core::demo::{seed_demo_dataset, DemoSeedSummary};
use firewatch_core::domain::{EnvironmentalReadings, FireIncident, IncidentStatus};
use firewatch_core::error::AppError;
use firewatch_core::ingest::readings_csv::import_readings_csv;
use firewatch_core::ingest::units_csv::import_units_csv;
use firewatch_core::ingest::ImportSummary;
use firewatch_core::report::generate_dispatch_markdown;
use firewatch_core::repo::update_incident_status;
use firewatch_core::scoring::{heat_index_c, score_readings, FireScore};
use firewatch_core::validate::{validate_readings, validate_workspace, ValidationReportItem};
use firewatch_core::workspace::{
    create_workspace, open_workspace_connection, WorkspaceMetadata,
};
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Drone dispatch for detected fires.
#[derive(Parser, Debug)]
#[command(name = "firewatch")]
#[command(about = "Score fire readings and dispatch the nearest available drones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new workspace database
    Init { db: PathBuf },

    /// Load the demo fleet and fire readings
    Seed { db: PathBuf },

    /// Import or update drones from a roster CSV
    ImportUnits { db: PathBuf, csv: PathBuf },

    /// Import sensor readings as fire events
    ImportReadings {
        db: PathBuf,
        csv: PathBuf,
        /// Coordinator config JSON (falls back to FIREWATCH_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Pair open fire events with available drones and record the assignments
    Dispatch {
        db: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the Markdown dispatch report
    Report {
        db: PathBuf,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Mark a fire event extinguished and free its drone
    Extinguish { db: PathBuf, incident_id: i64 },

    /// List validation warnings for every drone and fire event
    Validate { db: PathBuf },

    /// Score one set of readings without touching a workspace
    Score {
        /// Temperature in °C
        #[arg(allow_negative_numbers = true)]
        temperature_c: f64,
        /// Relative humidity in %
        humidity_pct: f64,
        /// Wind speed in km/h
        wind_speed_kmh: f64,
        /// Smoke level (0-100); treated as 0 when omitted
        smoke_level: Option<f64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct ScoreResponse {
    #[serde(flatten)]
    score: FireScore,
    heat_index_c: f64,
    warnings: Vec<firewatch_core::domain::ValidationWarning>,
}

fn load_config(path: Option<&Path>) -> Result<CoordinatorConfig, AppError> {
    let config = resolve_config(path)?;
    debug!(?config, "coordinator config");
    Ok(config)
}

fn read_text(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::new("CLI_READ_FAILED", "Failed to read input file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::wrap("CLI_OUTPUT_FAILED", "Failed to serialize output", e))?;
    println!("{text}");
    Ok(())
}

fn init(db: &Path) -> Result<WorkspaceMetadata, AppError> {
    create_workspace(db)
}

fn seed(db: &Path) -> Result<DemoSeedSummary, AppError> {
    let mut conn = open_workspace_connection(db)?;
    seed_demo_dataset(&mut conn)
}

fn import_units(db: &Path, csv: &Path) -> Result<ImportSummary, AppError> {
    let text = read_text(csv)?;
    let mut conn = open_workspace_connection(db)?;
    import_units_csv(&mut conn, &text)
}

fn import_readings(db: &Path, csv: &Path, config: Option<&Path>) -> Result<ImportSummary, AppError> {
    let config = load_config(config)?;
    let text = read_text(csv)?;
    let mut conn = open_workspace_connection(db)?;
    import_readings_csv(&mut conn, &text, &config.severity)
}

fn dispatch(db: &Path, config: Option<&Path>) -> Result<DispatchOutcome, AppError> {
    let config = load_config(config)?;
    let mut conn = open_workspace_connection(db)?;
    let mut store = SqliteStore::new(&mut conn);
    run_dispatch(&mut store, &config)
}

fn report(db: &Path, out: Option<&Path>) -> Result<(), AppError> {
    let conn = open_workspace_connection(db)?;
    let markdown = generate_dispatch_markdown(&conn)?;
    match out {
        None => print!("{markdown}"),
        Some(path) => std::fs::write(path, markdown).map_err(|e| {
            AppError::new("CLI_WRITE_FAILED", "Failed to write report")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?,
    }
    Ok(())
}

fn extinguish(db: &Path, incident_id: i64) -> Result<FireIncident, AppError> {
    let mut conn = open_workspace_connection(db)?;
    update_incident_status(&mut conn, incident_id, IncidentStatus::Extinguished)
}

fn validate(db: &Path) -> Result<Vec<ValidationReportItem>, AppError> {
    let conn = open_workspace_connection(db)?;
    validate_workspace(&conn)
}

fn score(readings: EnvironmentalReadings, config: Option<&Path>) -> Result<ScoreResponse, AppError> {
    let config = load_config(config)?;
    Ok(ScoreResponse {
        score: score_readings(&readings, &config.severity),
        heat_index_c: heat_index_c(readings.temperature_c, readings.humidity_pct),
        warnings: validate_readings(&readings),
    })
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Init { db } => print_json(&init(&db)?),
        Command::Seed { db } => print_json(&seed(&db)?),
        Command::ImportUnits { db, csv } => print_json(&import_units(&db, &csv)?),
        Command::ImportReadings { db, csv, config } => {
            print_json(&import_readings(&db, &csv, config.as_deref())?)
        }
        Command::Dispatch { db, config } => print_json(&dispatch(&db, config.as_deref())?),
        Command::Report { db, out } => report(&db, out.as_deref()),
        Command::Extinguish { db, incident_id } => print_json(&extinguish(&db, incident_id)?),
        Command::Validate { db } => print_json(&validate(&db)?),
        Command::Score {
            temperature_c,
            humidity_pct,
            wind_speed_kmh,
            smoke_level,
            config,
        } => {
            let readings = EnvironmentalReadings {
                temperature_c,
                humidity_pct,
                wind_speed_kmh,
                smoke_level,
            };
            print_json(&score(readings, config.as_deref())?)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = %e.code, "{}", e.message);
            match serde_json::to_string_pretty(&e) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{e}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dispatch_accepts_config_flag() {
        let cli = Cli::try_parse_from(["firewatch", "dispatch", "ws.sqlite3", "--config", "c.json"])
            .unwrap();
        match cli.command {
            Command::Dispatch { db, config } => {
                assert_eq!(db, PathBuf::from("ws.sqlite3"));
                assert_eq!(config, Some(PathBuf::from("c.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn score_without_smoke() {
        let out = score(
            EnvironmentalReadings {
                temperature_c: 30.0,
                humidity_pct: 50.0,
                wind_speed_kmh: 10.0,
                smoke_level: None,
            },
            None,
        )
        .unwrap();
        assert!((out.score.intensity - 10.0).abs() < 1e-9);
        assert!(out.warnings.is_empty());
    }
}

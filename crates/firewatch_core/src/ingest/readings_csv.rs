use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{cell, has_header, parse_f64, parse_location, read_headers, reader, ImportSummary};
use crate::domain::{EnvironmentalReadings, IncidentStatus, ValidationWarning};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::normalize::timestamps::normalize_timestamp;
use crate::repo::{find_incident_by_fingerprint, insert_incident, NewIncident};
use crate::scoring::{score_readings, SeverityThresholds};

const REQUIRED_HEADERS: [&str; 4] = ["detected_at", "temperature_c", "humidity_pct", "wind_speed_kmh"];

/// Stable identity of a reading: where (5 decimals, about a metre) and when.
/// Two sensors reporting the same fire at the same instant collapse into one event.
pub fn reading_fingerprint(location: Option<&GeoPoint>, detected_at: &str) -> String {
    let place = match location {
        Some(p) => format!("{:.5},{:.5}", p.latitude, p.longitude),
        None => "unknown".to_string(),
    };
    let payload = format!("loc={place}|detected_at={detected_at}");
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn required(
    row: &csv::StringRecord,
    headers: &csv::StringRecord,
    field: &str,
    row_no: usize,
) -> Result<f64, ValidationWarning> {
    parse_f64(cell(row, headers, field), field, row_no)?.ok_or_else(|| {
        ValidationWarning::new("INGEST_READING_FIELD_MISSING", format!("{field} is empty"))
            .with_details(format!("row={row_no}"))
    })
}

fn incident_from_row(
    row: &csv::StringRecord,
    headers: &csv::StringRecord,
    row_no: usize,
    thresholds: &SeverityThresholds,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<NewIncident, ValidationWarning> {
    let raw_ts = cell(row, headers, "detected_at").unwrap_or("");
    let detected_at = normalize_timestamp("detected_at", raw_ts, warnings).ok_or_else(|| {
        ValidationWarning::new("INGEST_READING_TS_MISSING", "Reading has no usable detected_at")
            .with_details(format!("row={row_no}; value={raw_ts}"))
    })?;

    let readings = EnvironmentalReadings {
        temperature_c: required(row, headers, "temperature_c", row_no)?,
        humidity_pct: required(row, headers, "humidity_pct", row_no)?,
        wind_speed_kmh: required(row, headers, "wind_speed_kmh", row_no)?,
        smoke_level: parse_f64(cell(row, headers, "smoke_level"), "smoke_level", row_no)?,
    };

    let location = parse_location(row, headers, row_no)?;
    if location.is_none() {
        warnings.push(
            ValidationWarning::new(
                "INGEST_READING_LOCATION_MISSING",
                "Fire event stored without location; it will not be dispatched",
            )
            .with_details(format!("row={row_no}")),
        );
    }

    let score = score_readings(&readings, thresholds);
    Ok(NewIncident {
        fingerprint: reading_fingerprint(location.as_ref(), &detected_at),
        description: cell(row, headers, "description").map(str::to_string),
        location,
        status: IncidentStatus::Detected,
        severity: score.severity,
        readings: Some(readings),
        intensity: Some(score.intensity),
        detected_at,
    })
}

/// Import a batch of sensor readings as fire events.
///
/// Each row is scored with `thresholds` and stored as `detected`. Rows whose fingerprint
/// already exists are skipped, so re-importing a batch is a no-op. Malformed rows are
/// skipped with a warning.
pub fn import_readings_csv(
    conn: &mut Connection,
    csv_text: &str,
    thresholds: &SeverityThresholds,
) -> Result<ImportSummary, AppError> {
    let mut rdr = reader(csv_text);
    let headers = read_headers(&mut rdr, "INGEST_READINGS_CSV_HEADERS_FAILED")?;

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|h| !has_header(&headers, h))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::new(
            "INGEST_READINGS_CSV_HEADERS_MISSING",
            "Readings CSV is missing required columns",
        )
        .with_details(format!("missing={}", missing.join(","))));
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start readings import", e))?;

    let mut summary = ImportSummary {
        inserted: 0,
        updated: 0,
        skipped: 0,
        warnings: Vec::new(),
    };

    for (idx, result) in rdr.records().enumerate() {
        let row_no = idx + 1;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                summary.skipped += 1;
                summary.warnings.push(
                    ValidationWarning::new("INGEST_CSV_PARSE_FAILED", "Failed to parse CSV row")
                        .with_details(format!("row={row_no}; err={e}")),
                );
                continue;
            }
        };

        // Row-level notes only count once the row is actually stored.
        let mut row_warnings = Vec::new();
        let incident =
            match incident_from_row(&row, &headers, row_no, thresholds, &mut row_warnings) {
                Ok(i) => i,
                Err(w) => {
                    warn!(row = row_no, code = %w.code, "skipping reading row");
                    summary.skipped += 1;
                    summary.warnings.push(w);
                    continue;
                }
            };

        if find_incident_by_fingerprint(&tx, &incident.fingerprint)?.is_some() {
            summary.skipped += 1;
            summary.warnings.push(
                ValidationWarning::new(
                    "INGEST_READING_DUPLICATE",
                    "Reading matches an existing fire event",
                )
                .with_details(format!("row={row_no}; fingerprint={}", incident.fingerprint)),
            );
            continue;
        }

        insert_incident(&tx, &incident)?;
        summary.inserted += 1;
        summary.warnings.append(&mut row_warnings);
    }

    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit readings import", e))?;

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        warnings = summary.warnings.len(),
        "sensor readings imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::Severity;
    use crate::repo::list_incidents;

    fn conn() -> Connection {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn fingerprint_ignores_sub_metre_jitter() {
        let a = GeoPoint::new(-33.868_820_1, 151.209_290_1);
        let b = GeoPoint::new(-33.868_820_4, 151.209_289_8);
        let ts = "2026-07-04T12:00:00Z";
        assert_eq!(reading_fingerprint(Some(&a), ts), reading_fingerprint(Some(&b), ts));
        assert_ne!(reading_fingerprint(Some(&a), ts), reading_fingerprint(None, ts));
    }

    #[test]
    fn rows_are_scored_and_bad_rows_skipped() {
        let mut conn = conn();
        let csv = "\
detected_at,latitude,longitude,temperature_c,humidity_pct,wind_speed_kmh,smoke_level,description
2026-07-04T12:00:00Z,-33.80,151.10,120,10,15,60,ridge line
2026-07-04 12:05,-33.81,151.11,30,50,10,,grass
2026-07-04T12:10:00Z,-33.82,151.12,hot,50,10,,bad number
";
        let summary = import_readings_csv(&mut conn, csv, &SeverityThresholds::default()).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        let codes: Vec<&str> = summary.warnings.iter().map(|w| w.code.as_str()).collect();
        assert!(codes.contains(&"INGEST_TS_NORMALIZED"));
        assert!(codes.contains(&"INGEST_NUMBER_PARSE_FAILED"));

        let incidents = list_incidents(&conn).unwrap();
        assert_eq!(incidents[0].severity, Severity::High);
        assert_eq!(incidents[1].severity, Severity::Medium);
        assert!((incidents[1].intensity.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(incidents[1].detected_at, "2026-07-04T12:05:00Z");
    }

    #[test]
    fn skipped_row_reports_only_its_skip_reason() {
        let mut conn = conn();
        let csv = "\
detected_at,latitude,longitude,temperature_c,humidity_pct,wind_speed_kmh
2026-07-04 12:05,-33.81,151.11,hot,50,10
2026-07-04 12:10,,,30,NaN,10
";
        let summary = import_readings_csv(&mut conn, csv, &SeverityThresholds::default()).unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.skipped, 2);
        let got: Vec<(&str, Option<&str>)> = summary
            .warnings
            .iter()
            .map(|w| (w.code.as_str(), w.details.as_deref()))
            .collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, "INGEST_NUMBER_PARSE_FAILED");
        assert_eq!(got[1].0, "INGEST_NUMBER_PARSE_FAILED");
        assert!(got[1].1.unwrap().starts_with("row=2; value=NaN"));
        assert_eq!(list_incidents(&conn).unwrap().len(), 0);
    }

    #[test]
    fn missing_columns_fail_fast() {
        let mut conn = conn();
        let err =
            import_readings_csv(&mut conn, "detected_at,latitude\n", &SeverityThresholds::default())
                .unwrap_err();
        assert_eq!(err.code, "INGEST_READINGS_CSV_HEADERS_MISSING");
    }
}

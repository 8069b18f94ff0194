use rusqlite::Connection;
use tracing::{info, warn};

use super::{cell, parse_f64, parse_location, read_headers, reader, ImportSummary};
use crate::domain::{UnitKind, UnitStatus, ValidationWarning};
use crate::error::AppError;
use crate::repo::{find_unit_by_external_id, insert_unit, update_unit_roster, NewUnit};

/// Columns: `external_id`, `model` (required), `kind`, `status`, `battery_pct`,
/// `payload_capacity`, and either `location` or `latitude` + `longitude`.
/// Header matching is case-insensitive.
fn unit_from_row(
    row: &csv::StringRecord,
    headers: &csv::StringRecord,
    row_no: usize,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<NewUnit, ValidationWarning> {
    let model = cell(row, headers, "model").ok_or_else(|| {
        ValidationWarning::new("INGEST_UNIT_MODEL_MISSING", "Drone row has no model")
            .with_details(format!("row={row_no}"))
    })?;

    let kind = match cell(row, headers, "kind") {
        None => UnitKind::Water,
        Some(raw) => UnitKind::parse(raw).map_err(|e| {
            ValidationWarning::new(e.code, e.message).with_details(format!("row={row_no}"))
        })?,
    };
    let status = match cell(row, headers, "status") {
        None => UnitStatus::Available,
        Some(raw) => UnitStatus::parse(raw).map_err(|e| {
            ValidationWarning::new(e.code, e.message).with_details(format!("row={row_no}"))
        })?,
    };

    let battery_pct = match parse_f64(cell(row, headers, "battery_pct"), "battery_pct", row_no)? {
        None => 100,
        Some(v) if (0.0..=100.0).contains(&v) => v.round() as i64,
        Some(v) => {
            return Err(ValidationWarning::new(
                "VALIDATION_BATTERY_OUT_OF_RANGE",
                "battery_pct out of range",
            )
            .with_details(format!("row={row_no}; value={v}")))
        }
    };
    let payload_capacity =
        match parse_f64(cell(row, headers, "payload_capacity"), "payload_capacity", row_no)? {
            None => 0.0,
            Some(v) if v >= 0.0 => v,
            Some(v) => {
                return Err(ValidationWarning::new(
                    "VALIDATION_PAYLOAD_NEGATIVE",
                    "payload_capacity must be non-negative",
                )
                .with_details(format!("row={row_no}; value={v}")))
            }
        };

    let location = parse_location(row, headers, row_no)?;
    if location.is_none() {
        // Grounded drones have no fix; keep them, they just won't be dispatched.
        warnings.push(
            ValidationWarning::new("INGEST_UNIT_LOCATION_MISSING", "Drone imported without location")
                .with_details(format!("row={row_no}")),
        );
    }

    Ok(NewUnit {
        external_id: cell(row, headers, "external_id").map(str::to_string),
        model: model.to_string(),
        kind,
        status,
        location,
        battery_pct,
        payload_capacity,
    })
}

/// Import a drone roster. Rows with a known `external_id` update the roster fields of the
/// existing drone (never its dispatch status); other rows insert. Bad rows are skipped
/// with a warning and do not abort the import.
pub fn import_units_csv(conn: &mut Connection, csv_text: &str) -> Result<ImportSummary, AppError> {
    let mut rdr = reader(csv_text);
    let headers = read_headers(&mut rdr, "INGEST_UNITS_CSV_HEADERS_FAILED")?;

    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start drone import", e))?;

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

        let unit = match unit_from_row(&row, &headers, row_no, &mut summary.warnings) {
            Ok(u) => u,
            Err(w) => {
                warn!(row = row_no, code = %w.code, "skipping drone row");
                summary.skipped += 1;
                summary.warnings.push(w);
                continue;
            }
        };

        let existing = match unit.external_id.as_deref() {
            Some(ext) => find_unit_by_external_id(&tx, ext)?,
            None => None,
        };
        match existing {
            Some(id) => {
                update_unit_roster(&tx, id, &unit)?;
                summary.updated += 1;
            }
            None => {
                insert_unit(&tx, &unit)?;
                summary.inserted += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit drone import", e))?;

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        "drone roster imported"
    );
    Ok(summary)
}

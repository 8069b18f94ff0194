//! CSV ingestion of drone rosters and sensor reading batches.

pub mod readings_csv;
pub mod units_csv;

use serde::{Deserialize, Serialize};

use crate::domain::ValidationWarning;
use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsvPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub warnings: Vec<ValidationWarning>,
}

pub(crate) fn reader(csv_text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(csv_text.as_bytes())
}

pub(crate) fn read_headers(
    rdr: &mut csv::Reader<&[u8]>,
    code: &str,
) -> Result<csv::StringRecord, AppError> {
    rdr.headers()
        .cloned()
        .map_err(|e| AppError::wrap(code, "Failed to read CSV headers", e))
}

/// First `max_rows` data rows, for a "does this look right" check before importing.
pub fn preview_csv(csv_text: &str, max_rows: usize) -> Result<CsvPreview, AppError> {
    let mut rdr = reader(csv_text);
    let headers = read_headers(&mut rdr, "INGEST_CSV_HEADERS_FAILED")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records().take(max_rows) {
        let row = result.map_err(|e| AppError::wrap("INGEST_CSV_PARSE_FAILED", "Failed to parse CSV row", e))?;
        rows.push(row.iter().map(str::to_string).collect());
    }

    Ok(CsvPreview { headers, rows })
}

/// Non-empty cell under `header`, matched case-insensitively.
pub(crate) fn cell<'a>(
    row: &'a csv::StringRecord,
    headers: &csv::StringRecord,
    header: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(header))
        .and_then(|idx| row.get(idx))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn has_header(headers: &csv::StringRecord, header: &str) -> bool {
    headers.iter().any(|h| h.eq_ignore_ascii_case(header))
}

pub(crate) fn parse_f64(raw: Option<&str>, field: &str, row_no: usize) -> Result<Option<f64>, ValidationWarning> {
    let Some(s) = raw else { return Ok(None) };
    let fail = |err: String| {
        ValidationWarning::new("INGEST_NUMBER_PARSE_FAILED", format!("Failed to parse {field}"))
            .with_details(format!("row={row_no}; value={s}; err={err}"))
    };
    let v = s.parse::<f64>().map_err(|e| fail(e.to_string()))?;
    if !v.is_finite() {
        return Err(fail("not a finite number".to_string()));
    }
    Ok(Some(v))
}

/// Location from either a `location` ("lat,lon") column or `latitude` + `longitude`.
pub(crate) fn parse_location(
    row: &csv::StringRecord,
    headers: &csv::StringRecord,
    row_no: usize,
) -> Result<Option<GeoPoint>, ValidationWarning> {
    if let Some(raw) = cell(row, headers, "location") {
        return GeoPoint::parse(raw).map(Some).map_err(|e| {
            ValidationWarning::new(e.code, e.message)
                .with_details(format!("row={row_no}; value={raw}"))
        });
    }

    let lat = parse_f64(cell(row, headers, "latitude"), "latitude", row_no)?;
    let lon = parse_f64(cell(row, headers, "longitude"), "longitude", row_no)?;
    match (lat, lon) {
        (None, None) => Ok(None),
        (Some(latitude), Some(longitude)) => {
            let p = GeoPoint::new(latitude, longitude);
            if p.is_valid() {
                Ok(Some(p))
            } else {
                Err(ValidationWarning::new("GEO_POINT_OUT_OF_RANGE", "Coordinates out of range")
                    .with_details(format!("row={row_no}; lat={latitude}; lon={longitude}")))
            }
        }
        _ => Err(ValidationWarning::new(
            "INGEST_LOCATION_INCOMPLETE",
            "Only one of latitude/longitude given",
        )
        .with_details(format!("row={row_no}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_limits_rows() {
        let text = "a,b\n1,2\n3,4\n5,6\n";
        let p = preview_csv(text, 2).unwrap();
        assert_eq!(p.headers, vec!["a", "b"]);
        assert_eq!(p.rows.len(), 2);
    }

    #[test]
    fn location_from_split_columns() {
        let mut rdr = reader("Latitude,Longitude\n-33.9,151.2\n10.0,\n");
        let headers = rdr.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();

        let p = parse_location(&rows[0], &headers, 1).unwrap();
        assert_eq!(p, Some(GeoPoint::new(-33.9, 151.2)));

        let err = parse_location(&rows[1], &headers, 2).unwrap_err();
        assert_eq!(err.code, "INGEST_LOCATION_INCOMPLETE");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert_eq!(parse_f64(Some("12.5"), "temperature_c", 1), Ok(Some(12.5)));
        for raw in ["NaN", "inf", "-infinity"] {
            let err = parse_f64(Some(raw), "temperature_c", 3).unwrap_err();
            assert_eq!(err.code, "INGEST_NUMBER_PARSE_FAILED");
            assert!(err.details.unwrap().starts_with("row=3"));
        }
    }
}

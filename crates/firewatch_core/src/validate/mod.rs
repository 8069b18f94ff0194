use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{
    EnvironmentalReadings, FireIncident, IncidentStatus, ResponseUnit, UnitStatus,
    ValidationWarning,
};
use crate::error::AppError;
use crate::geo::GeoPoint;

fn check_location(
    location: &Option<GeoPoint>,
    prefix: &str,
    warnings: &mut Vec<ValidationWarning>,
) {
    match location {
        None => warnings.push(ValidationWarning::new(
            format!("{prefix}_LOCATION_MISSING"),
            "No location; record cannot take part in dispatch",
        )),
        Some(p) if !p.is_valid() => warnings.push(
            ValidationWarning::new(
                format!("{prefix}_LOCATION_OUT_OF_RANGE"),
                "Latitude must be within -90..=90 and longitude within -180..=180",
            )
            .with_details(format!("lat={}; lon={}", p.latitude, p.longitude)),
        ),
        Some(_) => {}
    }
}

/// Plausibility checks on sensor readings. Scoring itself accepts anything finite or not;
/// these warnings are for callers that want to refuse garbage first.
pub fn validate_readings(readings: &EnvironmentalReadings) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for (field, v) in [
        ("temperature_c", Some(readings.temperature_c)),
        ("humidity_pct", Some(readings.humidity_pct)),
        ("wind_speed_kmh", Some(readings.wind_speed_kmh)),
        ("smoke_level", readings.smoke_level),
    ] {
        let Some(v) = v else { continue };
        if !v.is_finite() {
            warnings.push(
                ValidationWarning::new(
                    "VALIDATION_READING_NOT_FINITE",
                    format!("{field} is not a finite number"),
                )
                .with_details(format!("value={v}")),
            );
        }
    }

    if !(0.0..=100.0).contains(&readings.humidity_pct) {
        warnings.push(
            ValidationWarning::new("VALIDATION_HUMIDITY_OUT_OF_RANGE", "humidity_pct out of range")
                .with_details(format!("value={}", readings.humidity_pct)),
        );
    }
    if readings.wind_speed_kmh < 0.0 {
        warnings.push(
            ValidationWarning::new("VALIDATION_WIND_NEGATIVE", "wind_speed_kmh is negative")
                .with_details(format!("value={}", readings.wind_speed_kmh)),
        );
    }
    if let Some(smoke) = readings.smoke_level {
        if !(0.0..=100.0).contains(&smoke) {
            warnings.push(
                ValidationWarning::new("VALIDATION_SMOKE_OUT_OF_RANGE", "smoke_level out of range")
                    .with_details(format!("value={smoke}")),
            );
        }
    }

    warnings
}

pub fn validate_unit(unit: &ResponseUnit) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    check_location(&unit.location, "VALIDATION_UNIT", &mut warnings);

    if !(0..=100).contains(&unit.battery_pct) {
        warnings.push(
            ValidationWarning::new("VALIDATION_BATTERY_OUT_OF_RANGE", "battery_pct out of range")
                .with_details(format!("value={}", unit.battery_pct)),
        );
    }
    if !(unit.payload_capacity >= 0.0) {
        warnings.push(
            ValidationWarning::new(
                "VALIDATION_PAYLOAD_NEGATIVE",
                "payload_capacity must be non-negative",
            )
            .with_details(format!("value={}", unit.payload_capacity)),
        );
    }
    match (unit.status, unit.current_incident_id) {
        (UnitStatus::InUse, None) => warnings.push(ValidationWarning::new(
            "VALIDATION_UNIT_MISSION_MISSING",
            "Drone is in use but has no current fire event",
        )),
        (UnitStatus::Available, Some(id)) => warnings.push(
            ValidationWarning::new(
                "VALIDATION_UNIT_STALE_MISSION",
                "Drone is available but still points at a fire event",
            )
            .with_details(format!("incident_id={id}")),
        ),
        _ => {}
    }

    warnings
}

pub fn validate_incident(incident: &FireIncident) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    check_location(&incident.location, "VALIDATION_INCIDENT", &mut warnings);

    let detected = OffsetDateTime::parse(&incident.detected_at, &Rfc3339);
    if let Err(e) = &detected {
        warnings.push(
            ValidationWarning::new("VALIDATION_TS_PARSE_FAILED", "Failed to parse detected_at")
                .with_details(format!("value={}; err={e}", incident.detected_at)),
        );
    }

    match (&incident.status, &incident.ended_at) {
        (IncidentStatus::Extinguished, None) => warnings.push(ValidationWarning::new(
            "VALIDATION_ENDED_AT_MISSING",
            "Extinguished fire event has no end time",
        )),
        (IncidentStatus::Extinguished, Some(ended)) => {
            if let (Ok(start), Ok(end)) = (&detected, OffsetDateTime::parse(ended, &Rfc3339)) {
                if end < *start {
                    warnings.push(
                        ValidationWarning::new(
                            "VALIDATION_TS_ORDER_VIOLATION",
                            "ended_at must not precede detected_at",
                        )
                        .with_details(format!("detected_at={start}; ended_at={end}")),
                    );
                }
            }
        }
        (_, Some(_)) => warnings.push(ValidationWarning::new(
            "VALIDATION_ENDED_AT_ON_OPEN_INCIDENT",
            "Open fire event carries an end time",
        )),
        (_, None) => {}
    }

    if let Some(r) = &incident.readings {
        warnings.extend(validate_readings(r));
    }

    warnings
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReportItem {
    pub kind: String,
    pub id: i64,
    pub warnings: Vec<ValidationWarning>,
}

/// Validate every stored drone and fire event. Items with no warnings are omitted.
pub fn validate_workspace(conn: &Connection) -> Result<Vec<ValidationReportItem>, AppError> {
    let mut out = Vec::new();

    for unit in crate::repo::list_units(conn)? {
        let warnings = validate_unit(&unit);
        if !warnings.is_empty() {
            out.push(ValidationReportItem {
                kind: "drone".to_string(),
                id: unit.id,
                warnings,
            });
        }
    }
    for incident in crate::repo::list_incidents(conn)? {
        let warnings = validate_incident(&incident);
        if !warnings.is_empty() {
            out.push(ValidationReportItem {
                kind: "fire_event".to_string(),
                id: incident.id,
                warnings,
            });
        }
    }

    out.sort_by(|a, b| (a.kind.as_str(), a.id).cmp(&(b.kind.as_str(), b.id)));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Severity, UnitKind};

    #[test]
    fn unit_without_location_is_flagged() {
        let unit = ResponseUnit {
            id: 3,
            external_id: None,
            model: "X".to_string(),
            kind: UnitKind::Water,
            status: UnitStatus::InUse,
            location: None,
            battery_pct: 120,
            payload_capacity: -1.0,
            current_incident_id: None,
        };
        let codes: Vec<String> = validate_unit(&unit).into_iter().map(|w| w.code).collect();
        assert_eq!(
            codes,
            vec![
                "VALIDATION_UNIT_LOCATION_MISSING",
                "VALIDATION_BATTERY_OUT_OF_RANGE",
                "VALIDATION_PAYLOAD_NEGATIVE",
                "VALIDATION_UNIT_MISSION_MISSING",
            ]
        );
    }

    #[test]
    fn extinguished_before_detection_is_flagged() {
        let incident = FireIncident {
            id: 1,
            fingerprint: "fp".to_string(),
            description: None,
            location: Some(GeoPoint::new(1.0, 1.0)),
            status: IncidentStatus::Extinguished,
            severity: Severity::High,
            readings: None,
            intensity: None,
            detected_at: "2026-08-01T10:00:00Z".to_string(),
            ended_at: Some("2026-08-01T09:00:00Z".to_string()),
            assigned_unit_id: None,
        };
        let warnings = validate_incident(&incident);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "VALIDATION_TS_ORDER_VIOLATION");
    }

    #[test]
    fn readings_out_of_range() {
        let readings = EnvironmentalReadings {
            temperature_c: 30.0,
            humidity_pct: 140.0,
            wind_speed_kmh: -2.0,
            smoke_level: Some(f64::NAN),
        };
        let codes: Vec<String> = validate_readings(&readings)
            .into_iter()
            .map(|w| w.code)
            .collect();
        assert!(codes.contains(&"VALIDATION_READING_NOT_FINITE".to_string()));
        assert!(codes.contains(&"VALIDATION_HUMIDITY_OUT_OF_RANGE".to_string()));
        assert!(codes.contains(&"VALIDATION_WIND_NEGATIVE".to_string()));
        assert!(codes.contains(&"VALIDATION_SMOKE_OUT_OF_RANGE".to_string()));
    }
}

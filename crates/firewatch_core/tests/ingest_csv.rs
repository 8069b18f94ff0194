use pretty_assertions::assert_eq;

use firewatch_core::db;
use firewatch_core::domain::{Severity, UnitKind, UnitStatus};
use firewatch_core::geo::GeoPoint;
use firewatch_core::ingest::preview_csv;
use firewatch_core::ingest::readings_csv::import_readings_csv;
use firewatch_core::ingest::units_csv::import_units_csv;
use firewatch_core::repo::{count_incidents, find_unit_by_external_id, get_unit, list_incidents};
use firewatch_core::scoring::{SeverityThresholds, ThresholdSet};

const READINGS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../fixtures/demo/readings.csv"
));
const DRONES: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../fixtures/demo/drones.csv"
));

fn fresh() -> rusqlite::Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

#[test]
fn readings_reimport_is_a_no_op() {
    let mut conn = fresh();
    let thresholds = SeverityThresholds::default();

    let first = import_readings_csv(&mut conn, READINGS, &thresholds).expect("first");
    assert_eq!(first.inserted, 5);
    assert_eq!(first.skipped, 0);

    let second = import_readings_csv(&mut conn, READINGS, &thresholds).expect("second");
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 5);
    assert!(second
        .warnings
        .iter()
        .any(|w| w.code == "INGEST_READING_DUPLICATE"));
    assert_eq!(count_incidents(&conn).unwrap(), 5);
}

#[test]
fn fixture_readings_are_scored_and_normalized() {
    let mut conn = fresh();
    let summary =
        import_readings_csv(&mut conn, READINGS, &SeverityThresholds::default()).expect("import");

    let mut codes: Vec<&str> = summary.warnings.iter().map(|w| w.code.as_str()).collect();
    codes.sort_unstable();
    assert_eq!(
        codes,
        vec![
            "INGEST_READING_LOCATION_MISSING",
            "INGEST_TS_NORMALIZED",
            "INGEST_TS_NORMALIZED",
        ]
    );

    let incidents = list_incidents(&conn).unwrap();
    let severities: Vec<Severity> = incidents.iter().map(|i| i.severity).collect();
    assert_eq!(
        severities,
        vec![
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Medium,
            Severity::High,
        ]
    );
    assert_eq!(incidents[2].detected_at, "2026-01-15T06:40:00Z");
    assert_eq!(incidents[4].detected_at, "2026-01-15T07:00:00Z");
    assert_eq!(incidents[3].location, None);
    assert_eq!(incidents[2].readings.unwrap().smoke_level, None);
}

#[test]
fn thresholds_come_from_config() {
    let mut conn = fresh();
    // Raise the medium bar so only the worst fires rise above low.
    let strict = SeverityThresholds {
        high: ThresholdSet {
            temperature_c: 100.0,
            smoke_level: 50.0,
            wind_speed_kmh: 10.0,
        },
        medium: ThresholdSet {
            temperature_c: 99.0,
            smoke_level: 60.0,
            wind_speed_kmh: 20.0,
        },
    };
    import_readings_csv(&mut conn, READINGS, &strict).expect("import");
    let lows = list_incidents(&conn)
        .unwrap()
        .iter()
        .filter(|i| i.severity == Severity::Low)
        .count();
    assert_eq!(lows, 3);
}

#[test]
fn roster_reimport_updates_without_touching_dispatch_state() {
    let mut conn = fresh();
    let first = import_units_csv(&mut conn, DRONES).expect("import");
    assert_eq!(first.inserted, 5);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.warnings.len(), 1);
    assert_eq!(first.warnings[0].code, "INGEST_UNIT_LOCATION_MISSING");

    let id = find_unit_by_external_id(&conn, "DR-104").unwrap().expect("DR-104");
    assert_eq!(get_unit(&conn, id).unwrap().status, UnitStatus::InUse);

    // Same drone reported back at base with a fresh battery and an "available" status.
    let update = "EXTERNAL_ID,Model,Kind,Status,Battery_Pct,Location\n\
                  DR-104,FireHawk W3,water,available,99,\"-33.7000,150.3000\"\n";
    let second = import_units_csv(&mut conn, update).expect("update");
    assert_eq!(second.updated, 1);

    let drone = get_unit(&conn, id).unwrap();
    assert_eq!(drone.model, "FireHawk W3");
    assert_eq!(drone.battery_pct, 99);
    assert_eq!(drone.location, Some(GeoPoint::new(-33.7, 150.3)));
    assert_eq!(drone.kind, UnitKind::Water);
    assert_eq!(drone.status, UnitStatus::InUse);
}

#[test]
fn bad_roster_rows_are_skipped_with_row_numbers() {
    let mut conn = fresh();
    let csv = "external_id,model,kind,battery_pct,latitude,longitude\n\
               DR-1,FireHawk W2,water,80,-33.7,150.3\n\
               DR-2,,water,80,-33.7,150.3\n\
               DR-3,FireHawk W2,tanker,80,-33.7,150.3\n\
               DR-4,FireHawk W2,water,180,-33.7,150.3\n\
               DR-5,FireHawk W2,water,80,-33.7,\n\
               DR-6,FireHawk W2,water,80,95.0,150.3\n";
    let summary = import_units_csv(&mut conn, csv).expect("import");
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.skipped, 5);

    let got: Vec<(&str, Option<&str>)> = summary
        .warnings
        .iter()
        .map(|w| (w.code.as_str(), w.details.as_deref()))
        .collect();
    assert_eq!(got[0], ("INGEST_UNIT_MODEL_MISSING", Some("row=2")));
    assert_eq!(got[1].0, "DOMAIN_UNIT_KIND_INVALID");
    assert_eq!(got[2].0, "VALIDATION_BATTERY_OUT_OF_RANGE");
    assert_eq!(got[3], ("INGEST_LOCATION_INCOMPLETE", Some("row=5")));
    assert_eq!(got[4].0, "GEO_POINT_OUT_OF_RANGE");
}

#[test]
fn preview_shows_the_first_rows() {
    let preview = preview_csv(READINGS, 2).expect("preview");
    assert_eq!(preview.headers[0], "detected_at");
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.rows[0][7], "Ridge above Katoomba");
}

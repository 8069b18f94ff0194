use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::{offset_north, GeoPoint};
use crate::ingest::readings_csv::import_readings_csv;
use crate::ingest::units_csv::import_units_csv;
use crate::ingest::ImportSummary;
use crate::scoring::SeverityThresholds;

/// Staging base the demo fleet and fires are laid out around.
const DEMO_BASE: GeoPoint = GeoPoint {
    latitude: -33.7125,
    longitude: 150.3119,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoSeedSummary {
    pub units: ImportSummary,
    pub readings: ImportSummary,
}

fn demo_units_csv() -> String {
    let mut out = String::from(
        "external_id,model,kind,status,battery_pct,payload_capacity,latitude,longitude\n",
    );
    let models = ["FireHawk W2", "FireHawk W2", "Scout S1"];
    for i in 1..=8_usize {
        let model = models[(i - 1) % models.len()];
        let kind = if model.starts_with("Scout") {
            "surveillance"
        } else {
            "water"
        };
        // One drone in the hangar so the report shows every status.
        let status = if i == 8 { "maintenance" } else { "available" };
        let battery = 100 - (i * 7) % 60;
        let payload = if kind == "water" { 40.0 } else { 0.0 };
        // Staggered along a north-south line, 2.5 km apart.
        let p = offset_north(&DEMO_BASE, (i as f64 - 4.0) * 2_500.0);
        out.push_str(&format!(
            "DR-{i:03},{model},{kind},{status},{battery},{payload},{:.6},{:.6}\n",
            p.latitude, p.longitude
        ));
    }
    out
}

fn demo_readings_csv() -> String {
    let mut out = String::from(
        "detected_at,latitude,longitude,temperature_c,humidity_pct,wind_speed_kmh,smoke_level,description\n",
    );
    for i in 1..=12_usize {
        // Three bands so the severity mix is high / medium / low.
        let (temp, smoke, wind) = match i % 3 {
            0 => (115.0 + i as f64, 65.0, 18.0),
            1 => (85.0 + i as f64, 20.0, 4.0),
            _ => (45.0, 5.0, 2.0 + (i % 2) as f64),
        };
        let humidity = 10 + (i * 3) % 30;
        let p = offset_north(&DEMO_BASE, (i as f64 - 6.0) * 1_700.0);
        let lon = p.longitude + 0.01 * ((i % 4) as f64 - 1.5);
        let hour = 6 + i / 2;
        let minute = (i % 2) * 30;
        out.push_str(&format!(
            "2026-01-15T{hour:02}:{minute:02}:00Z,{:.6},{lon:.6},{temp},{humidity},{wind},{smoke},\"Demo fire {i}\"\n",
            p.latitude
        ));
    }
    out
}

/// Load a deterministic demo fleet and a morning's worth of fire readings.
///
/// Safe to run twice: drones upsert by external id and readings dedupe by fingerprint.
pub fn seed_demo_dataset(conn: &mut Connection) -> Result<DemoSeedSummary, AppError> {
    let units = import_units_csv(conn, &demo_units_csv())?;
    let readings = import_readings_csv(conn, &demo_readings_csv(), &SeverityThresholds::default())?;
    Ok(DemoSeedSummary { units, readings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use crate::repo::{count_incidents, count_units, list_incidents};

    #[test]
    fn seeding_is_repeatable() {
        let mut conn = crate::db::open_in_memory().unwrap();
        crate::db::migrate(&mut conn).unwrap();

        let first = seed_demo_dataset(&mut conn).unwrap();
        assert_eq!(first.units.inserted, 8);
        assert_eq!(first.readings.inserted, 12);
        assert_eq!(first.readings.skipped, 0);

        let second = seed_demo_dataset(&mut conn).unwrap();
        assert_eq!(second.units.updated, 8);
        assert_eq!(second.readings.inserted, 0);
        assert_eq!(count_units(&conn).unwrap(), 8);
        assert_eq!(count_incidents(&conn).unwrap(), 12);
    }

    #[test]
    fn demo_covers_every_severity() {
        let mut conn = crate::db::open_in_memory().unwrap();
        crate::db::migrate(&mut conn).unwrap();
        seed_demo_dataset(&mut conn).unwrap();

        let incidents = list_incidents(&conn).unwrap();
        for sev in [Severity::High, Severity::Medium, Severity::Low] {
            assert!(incidents.iter().any(|i| i.severity == sev), "{sev:?}");
        }
    }
}

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::DispatchPlan;
use crate::domain::{
    Assignment, EnvironmentalReadings, FireIncident, IncidentStatus, ResponseUnit, Severity,
    UnitKind, UnitStatus, UnitTask,
};
use crate::error::AppError;
use crate::geo::GeoPoint;

const UNIT_COLUMNS: &str = "id, external_id, model, kind, status, battery_pct, payload_capacity, \
     latitude, longitude, current_incident_id";

const INCIDENT_COLUMNS: &str = "id, fingerprint, description, latitude, longitude, status, severity, \
     temperature_c, humidity_pct, wind_speed_kmh, smoke_level, intensity, \
     detected_at, ended_at, assigned_unit_id";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewUnit {
    pub external_id: Option<String>,
    pub model: String,
    pub kind: UnitKind,
    pub status: UnitStatus,
    pub location: Option<GeoPoint>,
    pub battery_pct: i64,
    pub payload_capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewIncident {
    pub fingerprint: String,
    pub description: Option<String>,
    pub location: Option<GeoPoint>,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub readings: Option<EnvironmentalReadings>,
    pub intensity: Option<f64>,
    pub detected_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentRecord {
    pub id: i64,
    pub incident_id: i64,
    pub unit_id: i64,
    pub task: UnitTask,
    pub distance_m: f64,
    pub assigned_at: String,
    pub released_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentConflict {
    pub incident_id: i64,
    pub unit_id: i64,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplySummary {
    pub applied: Vec<Assignment>,
    pub conflicts: Vec<AssignmentConflict>,
}

fn location_from(lat: Option<f64>, lon: Option<f64>) -> Option<GeoPoint> {
    match (lat, lon) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
        _ => None,
    }
}

// Enum columns come back as text; decode them outside the rusqlite closure so a bad
// value surfaces as a structured AppError rather than a generic conversion failure.
struct UnitRow {
    id: i64,
    external_id: Option<String>,
    model: String,
    kind: String,
    status: String,
    battery_pct: i64,
    payload_capacity: f64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    current_incident_id: Option<i64>,
}

impl UnitRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            external_id: row.get(1)?,
            model: row.get(2)?,
            kind: row.get(3)?,
            status: row.get(4)?,
            battery_pct: row.get(5)?,
            payload_capacity: row.get(6)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
            current_incident_id: row.get(9)?,
        })
    }

    fn decode(self) -> Result<ResponseUnit, AppError> {
        Ok(ResponseUnit {
            id: self.id,
            external_id: self.external_id,
            model: self.model,
            kind: UnitKind::parse(&self.kind)?,
            status: UnitStatus::parse(&self.status)?,
            location: location_from(self.latitude, self.longitude),
            battery_pct: self.battery_pct,
            payload_capacity: self.payload_capacity,
            current_incident_id: self.current_incident_id,
        })
    }
}

struct IncidentRow {
    id: i64,
    fingerprint: String,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    status: String,
    severity: String,
    temperature_c: Option<f64>,
    humidity_pct: Option<f64>,
    wind_speed_kmh: Option<f64>,
    smoke_level: Option<f64>,
    intensity: Option<f64>,
    detected_at: String,
    ended_at: Option<String>,
    assigned_unit_id: Option<i64>,
}

impl IncidentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint: row.get(1)?,
            description: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            status: row.get(5)?,
            severity: row.get(6)?,
            temperature_c: row.get(7)?,
            humidity_pct: row.get(8)?,
            wind_speed_kmh: row.get(9)?,
            smoke_level: row.get(10)?,
            intensity: row.get(11)?,
            detected_at: row.get(12)?,
            ended_at: row.get(13)?,
            assigned_unit_id: row.get(14)?,
        })
    }

    fn decode(self) -> Result<FireIncident, AppError> {
        let readings = match (self.temperature_c, self.humidity_pct, self.wind_speed_kmh) {
            (Some(temperature_c), Some(humidity_pct), Some(wind_speed_kmh)) => {
                Some(EnvironmentalReadings {
                    temperature_c,
                    humidity_pct,
                    wind_speed_kmh,
                    smoke_level: self.smoke_level,
                })
            }
            _ => None,
        };
        Ok(FireIncident {
            id: self.id,
            fingerprint: self.fingerprint,
            description: self.description,
            location: location_from(self.latitude, self.longitude),
            status: IncidentStatus::parse(&self.status)?,
            severity: Severity::parse(&self.severity)?,
            readings,
            intensity: self.intensity,
            detected_at: self.detected_at,
            ended_at: self.ended_at,
            assigned_unit_id: self.assigned_unit_id,
        })
    }
}

fn query_units(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ResponseUnit>, AppError> {
    let sql = format!("SELECT {UNIT_COLUMNS} FROM drones {where_clause} ORDER BY id ASC");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to prepare drones query", e))?;
    let rows = stmt
        .query_map(params, UnitRow::read)
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query drones", e))?;

    let mut out = Vec::new();
    for r in rows {
        let row =
            r.map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to decode drone row", e))?;
        out.push(row.decode()?);
    }
    Ok(out)
}

fn query_incidents(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<FireIncident>, AppError> {
    // Detection order is the dispatch order for the greedy planner.
    let sql = format!(
        "SELECT {INCIDENT_COLUMNS} FROM fire_events {where_clause} ORDER BY detected_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::wrap("DB_QUERY_FAILED", "Failed to prepare fire events query", e)
    })?;
    let rows = stmt
        .query_map(params, IncidentRow::read)
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query fire events", e))?;

    let mut out = Vec::new();
    for r in rows {
        let row = r.map_err(|e| {
            AppError::wrap("DB_QUERY_FAILED", "Failed to decode fire event row", e)
        })?;
        out.push(row.decode()?);
    }
    Ok(out)
}

pub fn list_units(conn: &Connection) -> Result<Vec<ResponseUnit>, AppError> {
    query_units(conn, "", [])
}

pub fn list_available_units(conn: &Connection) -> Result<Vec<ResponseUnit>, AppError> {
    query_units(conn, "WHERE status = 'available'", [])
}

pub fn get_unit(conn: &Connection, id: i64) -> Result<ResponseUnit, AppError> {
    query_units(conn, "WHERE id = ?1", [id])?
        .pop()
        .ok_or_else(|| {
            AppError::new("DB_NOT_FOUND", "Drone not found").with_details(format!("id={id}"))
        })
}

pub fn list_incidents(conn: &Connection) -> Result<Vec<FireIncident>, AppError> {
    query_incidents(conn, "", [])
}

/// Open incidents with no drone yet, in detection order.
pub fn list_active_incidents(conn: &Connection) -> Result<Vec<FireIncident>, AppError> {
    query_incidents(
        conn,
        "WHERE status != 'extinguished' AND assigned_unit_id IS NULL",
        [],
    )
}

pub fn get_incident(conn: &Connection, id: i64) -> Result<FireIncident, AppError> {
    query_incidents(conn, "WHERE id = ?1", [id])?
        .pop()
        .ok_or_else(|| {
            AppError::new("DB_NOT_FOUND", "Fire event not found").with_details(format!("id={id}"))
        })
}

pub fn find_incident_by_fingerprint(
    conn: &Connection,
    fingerprint: &str,
) -> Result<Option<i64>, AppError> {
    conn.query_row(
        "SELECT id FROM fire_events WHERE fingerprint = ?1",
        [fingerprint],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to look up fire event fingerprint", e))
}

pub fn find_unit_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<i64>, AppError> {
    conn.query_row(
        "SELECT id FROM drones WHERE external_id = ?1",
        [external_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to look up drone identifier", e))
}

pub fn insert_unit(conn: &Connection, unit: &NewUnit) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO drones(
        external_id, model, kind, status, battery_pct, payload_capacity,
        latitude, longitude, created_at
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, strftime('%Y-%m-%dT%H:%M:%fZ','now'))
      "#,
        params![
            unit.external_id,
            unit.model,
            unit.kind.as_str(),
            unit.status.as_str(),
            unit.battery_pct,
            unit.payload_capacity,
            unit.location.map(|l| l.latitude),
            unit.location.map(|l| l.longitude),
        ],
    )
    .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to insert drone", e))?;
    Ok(conn.last_insert_rowid())
}

/// Update the mutable roster fields of an existing drone (not its dispatch state).
pub fn update_unit_roster(conn: &Connection, id: i64, unit: &NewUnit) -> Result<(), AppError> {
    let changed = conn
        .execute(
            r#"
      UPDATE drones
      SET model = ?1, kind = ?2, battery_pct = ?3, payload_capacity = ?4,
          latitude = ?5, longitude = ?6
      WHERE id = ?7
      "#,
            params![
                unit.model,
                unit.kind.as_str(),
                unit.battery_pct,
                unit.payload_capacity,
                unit.location.map(|l| l.latitude),
                unit.location.map(|l| l.longitude),
                id,
            ],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to update drone", e))?;
    if changed == 0 {
        return Err(AppError::new("DB_NOT_FOUND", "Drone not found").with_details(format!("id={id}")));
    }
    Ok(())
}

pub fn insert_incident(conn: &Connection, incident: &NewIncident) -> Result<i64, AppError> {
    let r = incident.readings;
    conn.execute(
        r#"
      INSERT INTO fire_events(
        fingerprint, description, latitude, longitude, status, severity,
        temperature_c, humidity_pct, wind_speed_kmh, smoke_level, intensity,
        detected_at, created_at
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                strftime('%Y-%m-%dT%H:%M:%fZ','now'))
      "#,
        params![
            incident.fingerprint,
            incident.description,
            incident.location.map(|l| l.latitude),
            incident.location.map(|l| l.longitude),
            incident.status.as_str(),
            incident.severity.as_str(),
            r.map(|r| r.temperature_c),
            r.map(|r| r.humidity_pct),
            r.map(|r| r.wind_speed_kmh),
            r.and_then(|r| r.smoke_level),
            incident.intensity,
            incident.detected_at,
        ],
    )
    .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to insert fire event", e))?;
    Ok(conn.last_insert_rowid())
}

fn conflict(message: &str, a: &Assignment) -> AppError {
    AppError::new("DISPATCH_CONFLICT", message).with_details(format!(
        "incident_id={}; unit_id={}",
        a.incident_id, a.unit_id
    ))
}

fn apply_in_tx(tx: &Transaction<'_>, a: &Assignment) -> Result<(), AppError> {
    // Claim the drone only if nobody else has since the plan was made.
    let claimed = tx
        .execute(
            "UPDATE drones SET status = 'in_use', current_incident_id = ?1 \
             WHERE id = ?2 AND status = 'available'",
            params![a.incident_id, a.unit_id],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to claim drone", e))?;
    if claimed == 0 {
        return Err(conflict("Drone is no longer available", a));
    }

    let opened = tx
        .execute(
            "UPDATE fire_events SET assigned_unit_id = ?1, status = 'in_progress' \
             WHERE id = ?2 AND status != 'extinguished' AND assigned_unit_id IS NULL",
            params![a.unit_id, a.incident_id],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to assign fire event", e))?;
    if opened == 0 {
        return Err(conflict("Fire event is closed or already assigned", a));
    }

    tx.execute(
        "INSERT INTO assignments(incident_id, unit_id, task, distance_m, assigned_at) \
         VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
        params![a.incident_id, a.unit_id, a.task.as_str(), a.distance_m],
    )
    .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to record assignment", e))?;

    Ok(())
}

/// Persist one assignment atomically. Returns `DISPATCH_CONFLICT` and writes nothing if
/// the drone is no longer available or the fire event is no longer open.
pub fn apply_assignment(conn: &mut Connection, a: &Assignment) -> Result<(), AppError> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start assignment transaction", e))?;
    // Dropping `tx` on error rolls back.
    apply_in_tx(&tx, a)?;
    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit assignment", e))
}

/// Apply every assignment in the plan, each in its own transaction. Conflicts are
/// collected; any other failure aborts.
pub fn apply_dispatch_plan(
    conn: &mut Connection,
    plan: &DispatchPlan,
) -> Result<ApplySummary, AppError> {
    let mut applied = Vec::new();
    let mut conflicts = Vec::new();

    for a in &plan.assignments {
        match apply_assignment(conn, a) {
            Ok(()) => applied.push(a.clone()),
            Err(e) if e.is("DISPATCH_CONFLICT") => {
                warn!(
                    incident_id = a.incident_id,
                    unit_id = a.unit_id,
                    "{}",
                    e.message
                );
                conflicts.push(AssignmentConflict {
                    incident_id: a.incident_id,
                    unit_id: a.unit_id,
                    code: e.code,
                    reason: e.message,
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        applied = applied.len(),
        conflicts = conflicts.len(),
        "dispatch plan applied"
    );
    Ok(ApplySummary { applied, conflicts })
}

fn release_in_tx(tx: &Transaction<'_>, unit_id: i64) -> Result<bool, AppError> {
    let released = tx
        .execute(
            "UPDATE drones SET status = 'available', current_incident_id = NULL \
             WHERE id = ?1 AND status = 'in_use'",
            [unit_id],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to release drone", e))?;
    tx.execute(
        "UPDATE assignments SET released_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') \
         WHERE unit_id = ?1 AND released_at IS NULL",
        [unit_id],
    )
    .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to close assignment", e))?;
    Ok(released > 0)
}

/// Return an in-use drone to the available pool.
pub fn release_unit(conn: &mut Connection, unit_id: i64) -> Result<(), AppError> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start release transaction", e))?;
    if !release_in_tx(&tx, unit_id)? {
        return Err(AppError::new("UNIT_NOT_IN_USE", "Drone is not on a mission")
            .with_details(format!("unit_id={unit_id}")));
    }
    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit drone release", e))
}

/// Move a fire event to `status`. Extinguishing stamps `ended_at` and frees its drone.
pub fn update_incident_status(
    conn: &mut Connection,
    incident_id: i64,
    status: IncidentStatus,
) -> Result<FireIncident, AppError> {
    let current = get_incident(conn, incident_id)?;
    if current.status == IncidentStatus::Extinguished && status != IncidentStatus::Extinguished {
        return Err(AppError::new(
            "INCIDENT_STATUS_TERMINAL",
            "Extinguished fire events cannot be reopened",
        )
        .with_details(format!("incident_id={incident_id}")));
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to start status transaction", e))?;

    if status == IncidentStatus::Extinguished {
        tx.execute(
            "UPDATE fire_events SET status = 'extinguished', \
             ended_at = COALESCE(ended_at, strftime('%Y-%m-%dT%H:%M:%SZ','now')) WHERE id = ?1",
            [incident_id],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to update fire event", e))?;
        if let Some(unit_id) = current.assigned_unit_id {
            if !release_in_tx(&tx, unit_id)? {
                warn!(unit_id, incident_id, "assigned drone was not in use at extinguish time");
            }
        }
    } else {
        tx.execute(
            "UPDATE fire_events SET status = ?1 WHERE id = ?2",
            params![status.as_str(), incident_id],
        )
        .map_err(|e| AppError::wrap("DB_WRITE_FAILED", "Failed to update fire event", e))?;
    }

    tx.commit()
        .map_err(|e| AppError::wrap("DB_TX_FAILED", "Failed to commit status change", e))?;
    get_incident(conn, incident_id)
}

pub fn list_assignments(conn: &Connection) -> Result<Vec<AssignmentRecord>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, incident_id, unit_id, task, distance_m, assigned_at, released_at \
             FROM assignments ORDER BY assigned_at ASC, id ASC",
        )
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to prepare assignments query", e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to query assignments", e))?;

    let mut out = Vec::new();
    for r in rows {
        let (id, incident_id, unit_id, task, distance_m, assigned_at, released_at) = r
            .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to decode assignment row", e))?;
        out.push(AssignmentRecord {
            id,
            incident_id,
            unit_id,
            task: UnitTask::parse(&task)?,
            distance_m,
            assigned_at,
            released_at,
        });
    }
    Ok(out)
}

pub fn count_units(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM drones", [], |row| row.get(0))
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to count drones", e))
}

pub fn count_incidents(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM fire_events", [], |row| row.get(0))
        .map_err(|e| AppError::wrap("DB_QUERY_FAILED", "Failed to count fire events", e))
}

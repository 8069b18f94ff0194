use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::geo::GeoPoint;

/// Lifecycle of a fire incident. `Extinguished` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Detected,
    InProgress,
    Extinguished,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Detected => "detected",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Extinguished => "extinguished",
        }
    }

    /// Accepts the stored names plus `active`, which older feeds use for `in_progress`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "detected" => Ok(IncidentStatus::Detected),
            "in_progress" | "active" => Ok(IncidentStatus::InProgress),
            "extinguished" => Ok(IncidentStatus::Extinguished),
            other => Err(AppError::new(
                "DOMAIN_INCIDENT_STATUS_INVALID",
                "Unknown incident status",
            )
            .with_details(format!("value={other}"))),
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, IncidentStatus::Extinguished)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(AppError::new("DOMAIN_SEVERITY_INVALID", "Unknown severity")
                .with_details(format!("value={other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    InUse,
    Maintenance,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::InUse => "in_use",
            UnitStatus::Maintenance => "maintenance",
        }
    }

    /// `mission` is the drone controller's name for `in_use`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(UnitStatus::Available),
            "in_use" | "mission" => Ok(UnitStatus::InUse),
            "maintenance" => Ok(UnitStatus::Maintenance),
            other => Err(
                AppError::new("DOMAIN_UNIT_STATUS_INVALID", "Unknown drone status")
                    .with_details(format!("value={other}")),
            ),
        }
    }
}

/// What a drone carries, which decides the task it gets on assignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Water,
    Surveillance,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Water => "water",
            UnitKind::Surveillance => "surveillance",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "water" => Ok(UnitKind::Water),
            "surveillance" => Ok(UnitKind::Surveillance),
            other => Err(AppError::new("DOMAIN_UNIT_KIND_INVALID", "Unknown drone kind")
                .with_details(format!("value={other}"))),
        }
    }

    pub fn task(&self) -> UnitTask {
        match self {
            UnitKind::Water => UnitTask::Extinguish,
            UnitKind::Surveillance => UnitTask::Monitor,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitTask {
    Extinguish,
    Monitor,
}

impl UnitTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitTask::Extinguish => "extinguish",
            UnitTask::Monitor => "monitor",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "extinguish" => Ok(UnitTask::Extinguish),
            "monitor" => Ok(UnitTask::Monitor),
            other => Err(AppError::new("DOMAIN_UNIT_TASK_INVALID", "Unknown task")
                .with_details(format!("value={other}"))),
        }
    }
}

/// Environmental readings taken at or near a fire.
///
/// Units are fixed: Celsius, percent relative humidity, km/h. Smoke level is a
/// sensor-specific 0..100 scale and may be absent when no smoke sensor reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentalReadings {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_kmh: f64,
    pub smoke_level: Option<f64>,
}

/// A detected fire requiring a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FireIncident {
    pub id: i64,
    pub fingerprint: String,
    pub description: Option<String>,
    pub location: Option<GeoPoint>,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub readings: Option<EnvironmentalReadings>,
    pub intensity: Option<f64>,
    /// Canonical RFC3339 UTC.
    pub detected_at: String,
    pub ended_at: Option<String>,
    pub assigned_unit_id: Option<i64>,
}

impl FireIncident {
    /// Whole minutes from detection to `ended_at`; `None` while the fire is still burning
    /// or when either timestamp does not parse.
    pub fn duration_minutes(&self) -> Option<i64> {
        let ended = self.ended_at.as_deref()?;
        let start = OffsetDateTime::parse(&self.detected_at, &Rfc3339).ok()?;
        let end = OffsetDateTime::parse(ended, &Rfc3339).ok()?;
        let minutes = (end - start).whole_minutes();
        (minutes >= 0).then_some(minutes)
    }
}

/// A dispatchable asset; in practice a drone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseUnit {
    pub id: i64,
    pub external_id: Option<String>,
    pub model: String,
    pub kind: UnitKind,
    pub status: UnitStatus,
    pub location: Option<GeoPoint>,
    pub battery_pct: i64,
    pub payload_capacity: f64,
    pub current_incident_id: Option<i64>,
}

/// One incident paired with one unit. Returned by planning, applied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub incident_id: i64,
    pub unit_id: i64,
    pub task: UnitTask,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_aliases_are_accepted() {
        assert_eq!(
            IncidentStatus::parse("active").unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(UnitStatus::parse("Mission").unwrap(), UnitStatus::InUse);
        assert!(UnitStatus::parse("inactive").is_err());
    }

    #[test]
    fn unit_kind_decides_task() {
        assert_eq!(UnitKind::Water.task(), UnitTask::Extinguish);
        assert_eq!(UnitKind::Surveillance.task(), UnitTask::Monitor);
    }

    #[test]
    fn duration_needs_end_time() {
        let mut incident = FireIncident {
            id: 1,
            fingerprint: "fp".to_string(),
            description: None,
            location: None,
            status: IncidentStatus::InProgress,
            severity: Severity::Low,
            readings: None,
            intensity: None,
            detected_at: "2026-08-01T10:00:00Z".to_string(),
            ended_at: None,
            assigned_unit_id: None,
        };
        assert_eq!(incident.duration_minutes(), None);

        incident.ended_at = Some("2026-08-01T12:30:00Z".to_string());
        assert_eq!(incident.duration_minutes(), Some(150));
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::parse(" HIGH ").unwrap(), Severity::High);
    }
}

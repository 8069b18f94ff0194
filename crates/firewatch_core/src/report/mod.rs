use rusqlite::Connection;

use crate::domain::{FireIncident, IncidentStatus, Severity, UnitStatus};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::repo::{list_assignments, list_incidents, list_units};
use crate::validate::validate_workspace;

fn format_duration_minutes(minutes: Option<i64>) -> String {
    match minutes {
        None => "UNKNOWN".to_string(),
        Some(m) if m >= 60 => format!("{}h {}m", m / 60, m % 60),
        Some(m) => format!("{m}m"),
    }
}

fn format_location(location: &Option<GeoPoint>) -> String {
    match location {
        Some(p) => format!("{:.4}, {:.4}", p.latitude, p.longitude),
        None => "NO_LOCATION".to_string(),
    }
}

fn format_opt_f64(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "-".to_string(),
    }
}

fn percentile(values: &mut [i64], pct_num: i64, pct_den: i64) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    // Nearest rank on 0..n-1: idx = floor((n-1) * pct).
    let idx = ((values.len() as i64 - 1) * pct_num) / pct_den;
    values.get(idx as usize).copied()
}

fn open_first(a: &FireIncident, b: &FireIncident) -> std::cmp::Ordering {
    // Worst first, then oldest.
    (std::cmp::Reverse(a.severity), &a.detected_at, a.id).cmp(&(
        std::cmp::Reverse(b.severity),
        &b.detected_at,
        b.id,
    ))
}

/// Markdown summary of fleet and fire state, for the duty officer.
///
/// Output depends only on database contents; ordering rules are fixed so the report can be
/// diffed between runs.
pub fn generate_dispatch_markdown(conn: &Connection) -> Result<String, AppError> {
    let incidents = list_incidents(conn)?;
    let units = list_units(conn)?;
    let assignments = list_assignments(conn)?;
    let validation = validate_workspace(conn)?;

    let open: Vec<&FireIncident> = {
        let mut v: Vec<&FireIncident> = incidents
            .iter()
            .filter(|i| i.status != IncidentStatus::Extinguished)
            .collect();
        v.sort_by(|a, b| open_first(a, b));
        v
    };
    let unassigned = open.iter().filter(|i| i.assigned_unit_id.is_none()).count();
    let mut durations: Vec<i64> = incidents.iter().filter_map(|i| i.duration_minutes()).collect();

    let mut out = String::new();
    out.push_str("# Fire Dispatch Report\n\n");

    out.push_str("## Summary\n\n");
    out.push_str(&format!("- Fire events: **{}**\n", incidents.len()));
    out.push_str(&format!(
        "- Open: **{}** ({} awaiting a drone)\n",
        open.len(),
        unassigned
    ));
    out.push_str(&format!(
        "- Extinguished: **{}**\n",
        incidents.len() - open.len()
    ));
    out.push_str(&format!("- Drones: **{}**\n", units.len()));
    for status in [UnitStatus::Available, UnitStatus::InUse, UnitStatus::Maintenance] {
        let n = units.iter().filter(|u| u.status == status).count();
        out.push_str(&format!("  - {}: {}\n", status.as_str(), n));
    }
    out.push('\n');

    out.push_str("## Severity distribution\n\n");
    for sev in [Severity::High, Severity::Medium, Severity::Low] {
        let total = incidents.iter().filter(|i| i.severity == sev).count();
        let still_open = open.iter().filter(|i| i.severity == sev).count();
        out.push_str(&format!(
            "- {}: {} ({} open)\n",
            sev.as_str(),
            total,
            still_open
        ));
    }
    out.push('\n');

    out.push_str("## Open fire events\n\n");
    if open.is_empty() {
        out.push_str("_None._\n\n");
    } else {
        out.push_str("_Sort keys:_ severity (high first), then `detected_at`, then `id`.\n\n");
        out.push_str("| ID | Detected | Severity | Intensity | Location | Status | Drone |\n");
        out.push_str("|---:|---|---|---:|---|---|---:|\n");
        for i in &open {
            let drone = i
                .assigned_unit_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "UNASSIGNED".to_string());
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                i.id,
                i.detected_at,
                i.severity.as_str(),
                format_opt_f64(i.intensity, 1),
                format_location(&i.location),
                i.status.as_str(),
                drone
            ));
        }
        out.push('\n');
    }

    out.push_str("## Drone fleet\n\n");
    if units.is_empty() {
        out.push_str("_No drones registered._\n\n");
    } else {
        out.push_str("| ID | External ID | Model | Kind | Status | Battery | Location | Fire |\n");
        out.push_str("|---:|---|---|---|---|---:|---|---:|\n");
        for u in &units {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {}% | {} | {} |\n",
                u.id,
                u.external_id.as_deref().unwrap_or("-"),
                u.model,
                u.kind.as_str(),
                u.status.as_str(),
                u.battery_pct,
                format_location(&u.location),
                u.current_incident_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ));
        }
        out.push('\n');
    }

    out.push_str("## Assignments\n\n");
    if assignments.is_empty() {
        out.push_str("_No assignments recorded._\n\n");
    } else {
        let total_km: f64 = assignments.iter().map(|a| a.distance_m).sum::<f64>() / 1000.0;
        out.push_str(&format!(
            "Total travel distance: **{total_km:.2} km** over {} assignments.\n\n",
            assignments.len()
        ));
        out.push_str("| Fire | Drone | Task | Distance (km) | Assigned | Released |\n");
        out.push_str("|---:|---:|---|---:|---|---|\n");
        for a in &assignments {
            out.push_str(&format!(
                "| {} | {} | {} | {:.2} | {} | {} |\n",
                a.incident_id,
                a.unit_id,
                a.task.as_str(),
                a.distance_m / 1000.0,
                a.assigned_at,
                a.released_at.as_deref().unwrap_or("-")
            ));
        }
        out.push('\n');
    }

    out.push_str("## Time to extinguish\n\n");
    let known = durations.len();
    out.push_str(&format!(
        "- Known durations: {known}/{}\n",
        incidents.len() - open.len()
    ));
    out.push_str(&format!(
        "- P50: {}\n",
        format_duration_minutes(percentile(&mut durations, 50, 100))
    ));
    out.push_str(&format!(
        "- P90: {}\n",
        format_duration_minutes(percentile(&mut durations, 90, 100))
    ));
    out.push('\n');

    out.push_str("## Validation appendix\n\n");
    if validation.is_empty() {
        out.push_str("_No validation warnings._\n");
    } else {
        for item in &validation {
            let mut codes: Vec<&str> = item.warnings.iter().map(|w| w.code.as_str()).collect();
            codes.sort_unstable();
            out.push_str(&format!(
                "- {} {}: {}\n",
                item.kind,
                item.id,
                codes.join(", ")
            ));
        }
    }

    Ok(out)
}

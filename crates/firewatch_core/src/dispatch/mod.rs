//! Drone-to-fire dispatch planning.
//!
//! Everything here is pure: inputs are borrowed, nothing is written anywhere, and the
//! same inputs always give the same plan. Persisting a plan (and guarding against a
//! concurrent planner claiming the same drone) is `repo::apply_dispatch_plan`'s job.

mod hungarian;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    Assignment, FireIncident, ResponseUnit, UnitStatus, ValidationWarning,
};
use crate::geo::{haversine_m, GeoPoint};

/// Which pairing algorithm `plan_dispatch` runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Incidents in input order each take their nearest remaining drone.
    #[default]
    Greedy,
    /// Minimum total travel distance over the whole batch.
    MinTotalDistance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub strategy: StrategyKind,
    /// Drones below this battery percentage are not dispatched.
    pub min_battery_pct: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Greedy,
            min_battery_pct: 0,
        }
    }
}

/// A record that passed eligibility checks, with its location unwrapped.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a, T> {
    pub record: &'a T,
    pub location: GeoPoint,
}

/// Pairs eligible incidents with eligible drones.
///
/// Implementations return `(incident_index, unit_index)` pairs into the given slices.
/// Each index may appear at most once on either side.
pub trait AssignmentStrategy {
    fn name(&self) -> &'static str;

    fn pair(
        &self,
        incidents: &[Candidate<'_, FireIncident>],
        units: &[Candidate<'_, ResponseUnit>],
    ) -> Vec<(usize, usize)>;
}

/// Per-incident nearest match against a shrinking pool.
///
/// This is order dependent and not globally optimal: an early incident can claim the
/// only drone that was close to a later one. Kept as the default for parity with the
/// existing dispatch behaviour; use `MinTotalDistance` for a batch optimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyNearest;

impl AssignmentStrategy for GreedyNearest {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn pair(
        &self,
        incidents: &[Candidate<'_, FireIncident>],
        units: &[Candidate<'_, ResponseUnit>],
    ) -> Vec<(usize, usize)> {
        // Pool keeps input order so ties keep going to the earliest drone.
        let mut pool: Vec<usize> = (0..units.len()).collect();
        let mut pairs = Vec::new();

        for (incident_idx, incident) in incidents.iter().enumerate() {
            if pool.is_empty() {
                break;
            }
            let nearest = nearest_index(
                &incident.location,
                pool.iter().map(|&u| Some(units[u].location)),
            );
            if let Some((pool_pos, _)) = nearest {
                let unit_idx = pool.remove(pool_pos);
                pairs.push((incident_idx, unit_idx));
            }
        }

        pairs
    }
}

/// Minimum-total-distance matching (Hungarian algorithm, O(n^2 m)).
///
/// When there are more incidents than drones, the incidents left out are the ones whose
/// exclusion minimizes total distance, not the last ones in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinTotalDistance;

impl AssignmentStrategy for MinTotalDistance {
    fn name(&self) -> &'static str {
        "min_total_distance"
    }

    fn pair(
        &self,
        incidents: &[Candidate<'_, FireIncident>],
        units: &[Candidate<'_, ResponseUnit>],
    ) -> Vec<(usize, usize)> {
        if incidents.is_empty() || units.is_empty() {
            return Vec::new();
        }

        let mut pairs = Vec::new();
        if incidents.len() <= units.len() {
            let cost: Vec<Vec<f64>> = incidents
                .iter()
                .map(|i| {
                    units
                        .iter()
                        .map(|u| haversine_m(&i.location, &u.location))
                        .collect()
                })
                .collect();
            for (row, col) in hungarian::solve(&cost).into_iter().enumerate() {
                if let Some(col) = col {
                    pairs.push((row, col));
                }
            }
        } else {
            let cost: Vec<Vec<f64>> = units
                .iter()
                .map(|u| {
                    incidents
                        .iter()
                        .map(|i| haversine_m(&i.location, &u.location))
                        .collect()
                })
                .collect();
            for (row, col) in hungarian::solve(&cost).into_iter().enumerate() {
                if let Some(col) = col {
                    pairs.push((col, row));
                }
            }
        }

        pairs.sort_unstable();
        pairs
    }
}

/// Result of one planning pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchPlan {
    pub strategy: String,
    pub assignments: Vec<Assignment>,
    /// Eligible incidents that got no drone because the pool ran out.
    pub unmatched_incident_ids: Vec<i64>,
    /// Records skipped as malformed or ineligible.
    pub warnings: Vec<ValidationWarning>,
}

impl DispatchPlan {
    pub fn total_distance_m(&self) -> f64 {
        self.assignments.iter().map(|a| a.distance_m).sum()
    }
}

/// Index and distance of the closest location. Strict `<` keeps the first of equals.
fn nearest_index(
    target: &GeoPoint,
    locations: impl Iterator<Item = Option<GeoPoint>>,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, loc) in locations.enumerate() {
        let Some(loc) = loc else { continue };
        let d = haversine_m(target, &loc);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((idx, d)),
        }
    }
    best
}

/// Closest drone to `location` among `units`, or `None` when no drone has a location.
///
/// Status is not checked: callers pass a pool already filtered to available drones.
/// Drones without a location are skipped, never treated as distance zero. An invalid
/// target matches nothing.
pub fn find_nearest_unit<'a>(
    location: &GeoPoint,
    units: &'a [ResponseUnit],
) -> Option<&'a ResponseUnit> {
    if !location.is_valid() {
        warn!(
            latitude = location.latitude,
            longitude = location.longitude,
            "target location invalid; no nearest drone"
        );
        return None;
    }
    let locations = units.iter().map(|u| {
        if u.location.is_none() {
            warn!(unit_id = u.id, "drone has no location; excluded from nearest search");
        }
        u.location.filter(GeoPoint::is_valid)
    });
    nearest_index(location, locations).map(|(idx, _)| &units[idx])
}

/// Greedy batch assignment with no battery floor. Skipped records are logged.
pub fn assign_units_to_incidents(
    incidents: &[FireIncident],
    units: &[ResponseUnit],
) -> Vec<Assignment> {
    plan_with(&GreedyNearest, incidents, units, 0).assignments
}

/// Plan with the strategy and battery floor named in `config`.
pub fn plan_dispatch(
    incidents: &[FireIncident],
    units: &[ResponseUnit],
    config: &DispatchConfig,
) -> DispatchPlan {
    match config.strategy {
        StrategyKind::Greedy => plan_with(&GreedyNearest, incidents, units, config.min_battery_pct),
        StrategyKind::MinTotalDistance => {
            plan_with(&MinTotalDistance, incidents, units, config.min_battery_pct)
        }
    }
}

fn skip(warnings: &mut Vec<ValidationWarning>, code: &str, message: &str, details: String) {
    warn!(code, details = %details, "{message}");
    warnings.push(ValidationWarning::new(code, message).with_details(details));
}

fn eligible_incidents<'a>(
    incidents: &'a [FireIncident],
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<Candidate<'a, FireIncident>> {
    let mut out = Vec::with_capacity(incidents.len());
    let mut seen = HashSet::new();

    for incident in incidents {
        let id = format!("incident_id={}", incident.id);
        if !incident.status.is_dispatchable() {
            skip(
                warnings,
                "DISPATCH_INCIDENT_NOT_ELIGIBLE",
                "Incident is extinguished",
                id,
            );
            continue;
        }
        if !seen.insert(incident.id) {
            skip(
                warnings,
                "DISPATCH_INCIDENT_DUPLICATE",
                "Incident listed more than once",
                id,
            );
            continue;
        }
        match incident.location {
            None => skip(
                warnings,
                "DISPATCH_INCIDENT_LOCATION_MISSING",
                "Incident has no location",
                id,
            ),
            Some(loc) if !loc.is_valid() => skip(
                warnings,
                "DISPATCH_INCIDENT_LOCATION_INVALID",
                "Incident location out of range",
                format!("{id}; location={loc}"),
            ),
            Some(location) => out.push(Candidate {
                record: incident,
                location,
            }),
        }
    }
    out
}

fn eligible_units<'a>(
    units: &'a [ResponseUnit],
    min_battery_pct: i64,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<Candidate<'a, ResponseUnit>> {
    let mut out = Vec::with_capacity(units.len());
    let mut seen = HashSet::new();

    for unit in units {
        let id = format!("unit_id={}", unit.id);
        if unit.status != UnitStatus::Available {
            skip(
                warnings,
                "DISPATCH_UNIT_NOT_AVAILABLE",
                "Drone is not available",
                format!("{id}; status={}", unit.status.as_str()),
            );
            continue;
        }
        if unit.battery_pct < min_battery_pct {
            skip(
                warnings,
                "DISPATCH_UNIT_BATTERY_LOW",
                "Drone battery below dispatch floor",
                format!("{id}; battery_pct={}; floor={min_battery_pct}", unit.battery_pct),
            );
            continue;
        }
        // A drone listed twice must not be handed out twice.
        if !seen.insert(unit.id) {
            skip(
                warnings,
                "DISPATCH_UNIT_DUPLICATE",
                "Drone listed more than once",
                id,
            );
            continue;
        }
        match unit.location {
            None => skip(
                warnings,
                "DISPATCH_UNIT_LOCATION_MISSING",
                "Drone has no location",
                id,
            ),
            Some(loc) if !loc.is_valid() => skip(
                warnings,
                "DISPATCH_UNIT_LOCATION_INVALID",
                "Drone location out of range",
                format!("{id}; location={loc}"),
            ),
            Some(location) => out.push(Candidate {
                record: unit,
                location,
            }),
        }
    }
    out
}

/// Filter, pair, and package. Shared by every strategy so eligibility rules live in one place.
pub fn plan_with(
    strategy: &dyn AssignmentStrategy,
    incidents: &[FireIncident],
    units: &[ResponseUnit],
    min_battery_pct: i64,
) -> DispatchPlan {
    let mut warnings = Vec::new();
    let incident_pool = eligible_incidents(incidents, &mut warnings);
    let unit_pool = eligible_units(units, min_battery_pct, &mut warnings);

    let pairs = strategy.pair(&incident_pool, &unit_pool);

    let mut matched = vec![false; incident_pool.len()];
    let mut assignments = Vec::with_capacity(pairs.len());
    for (i, u) in pairs {
        let incident = &incident_pool[i];
        let unit = &unit_pool[u];
        let distance_m = haversine_m(&incident.location, &unit.location);
        debug!(
            incident_id = incident.record.id,
            unit_id = unit.record.id,
            distance_m,
            "paired drone with incident"
        );
        matched[i] = true;
        assignments.push(Assignment {
            incident_id: incident.record.id,
            unit_id: unit.record.id,
            task: unit.record.kind.task(),
            distance_m,
        });
    }

    let unmatched_incident_ids: Vec<i64> = incident_pool
        .iter()
        .zip(matched)
        .filter(|(_, m)| !m)
        .map(|(c, _)| c.record.id)
        .collect();

    info!(
        strategy = strategy.name(),
        assigned = assignments.len(),
        unmatched = unmatched_incident_ids.len(),
        skipped = warnings.len(),
        "dispatch planned"
    );

    DispatchPlan {
        strategy: strategy.name().to_string(),
        assignments,
        unmatched_incident_ids,
        warnings,
    }
}

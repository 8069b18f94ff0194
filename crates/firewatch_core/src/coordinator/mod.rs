//! One dispatch cycle: read open fire events and free drones, plan, persist.
//!
//! Storage sits behind `DispatchStore` so the cycle can run against SQLite or an
//! in-memory double.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{validate_config, CoordinatorConfig};
use crate::dispatch::{plan_dispatch, DispatchPlan};
use crate::domain::{Assignment, FireIncident, ResponseUnit, ValidationWarning};
use crate::error::AppError;
use crate::repo::{self, ApplySummary, AssignmentConflict};

pub trait DispatchStore {
    /// Fire events that are not extinguished and have no drone yet, in detection order.
    fn active_incidents(&self) -> Result<Vec<FireIncident>, AppError>;

    fn available_units(&self) -> Result<Vec<ResponseUnit>, AppError>;

    /// Persist a plan. Assignments that lost a race come back as conflicts.
    fn apply(&mut self, plan: &DispatchPlan) -> Result<ApplySummary, AppError>;
}

pub struct SqliteStore<'c> {
    conn: &'c mut Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }
}

impl DispatchStore for SqliteStore<'_> {
    fn active_incidents(&self) -> Result<Vec<FireIncident>, AppError> {
        repo::list_active_incidents(self.conn)
    }

    fn available_units(&self) -> Result<Vec<ResponseUnit>, AppError> {
        repo::list_available_units(self.conn)
    }

    fn apply(&mut self, plan: &DispatchPlan) -> Result<ApplySummary, AppError> {
        repo::apply_dispatch_plan(self.conn, plan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchOutcome {
    pub plan: DispatchPlan,
    pub applied: Vec<Assignment>,
    pub conflicts: Vec<AssignmentConflict>,
    pub config_warnings: Vec<ValidationWarning>,
}

pub fn run_dispatch(
    store: &mut dyn DispatchStore,
    config: &CoordinatorConfig,
) -> Result<DispatchOutcome, AppError> {
    let config_warnings = validate_config(config);
    for w in &config_warnings {
        warn!(code = %w.code, "{}", w.message);
    }

    let incidents = store.active_incidents()?;
    let units = store.available_units()?;
    let plan = plan_dispatch(&incidents, &units, &config.dispatch);

    let summary = if plan.assignments.is_empty() {
        ApplySummary {
            applied: Vec::new(),
            conflicts: Vec::new(),
        }
    } else {
        store.apply(&plan)?
    };

    info!(
        strategy = %plan.strategy,
        incidents = incidents.len(),
        units = units.len(),
        planned = plan.assignments.len(),
        applied = summary.applied.len(),
        conflicts = summary.conflicts.len(),
        unmatched = plan.unmatched_incident_ids.len(),
        "dispatch cycle finished"
    );

    Ok(DispatchOutcome {
        plan,
        applied: summary.applied,
        conflicts: summary.conflicts,
        config_warnings,
    })
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::DispatchConfig;
use crate::domain::ValidationWarning;
use crate::error::AppError;
use crate::scoring::{SeverityThresholds, ThresholdSet};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "FIREWATCH_CONFIG";

/// Tunables for scoring and dispatch. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub severity: SeverityThresholds,
    pub dispatch: DispatchConfig,
}

pub fn parse_config(json: &str) -> Result<CoordinatorConfig, AppError> {
    serde_json::from_str(json)
        .map_err(|e| AppError::wrap("CONFIG_PARSE_FAILED", "Failed to parse coordinator config", e))
}

pub fn load_config(path: &Path) -> Result<CoordinatorConfig, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::new("CONFIG_READ_FAILED", "Failed to read coordinator config")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let config = parse_config(&text)?;
    info!(path = %path.display(), "loaded coordinator config");
    Ok(config)
}

/// Resolve config: explicit path, else `FIREWATCH_CONFIG`, else defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<CoordinatorConfig, AppError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(p) if !p.is_empty() => load_config(Path::new(&p)),
        _ => Ok(CoordinatorConfig::default()),
    }
}

fn check_set(
    name: &str,
    set: &ThresholdSet,
    warnings: &mut Vec<ValidationWarning>,
) {
    for (field, v) in [
        ("temperature_c", set.temperature_c),
        ("smoke_level", set.smoke_level),
        ("wind_speed_kmh", set.wind_speed_kmh),
    ] {
        if !v.is_finite() {
            warnings.push(
                ValidationWarning::new(
                    "CONFIG_THRESHOLD_NOT_FINITE",
                    format!("severity.{name}.{field} is not a finite number"),
                )
                .with_details(format!("value={v}")),
            );
        }
    }
}

/// Soft checks. A config with warnings still loads; callers decide whether to refuse it.
pub fn validate_config(config: &CoordinatorConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let high = &config.severity.high;
    let medium = &config.severity.medium;

    check_set("high", high, &mut warnings);
    check_set("medium", medium, &mut warnings);

    for (field, h, m) in [
        ("temperature_c", high.temperature_c, medium.temperature_c),
        ("smoke_level", high.smoke_level, medium.smoke_level),
        ("wind_speed_kmh", high.wind_speed_kmh, medium.wind_speed_kmh),
    ] {
        if h < m {
            warnings.push(
                ValidationWarning::new(
                    "CONFIG_THRESHOLDS_INVERTED",
                    format!("severity.high.{field} is below severity.medium.{field}"),
                )
                .with_details(format!("high={h}; medium={m}")),
            );
        }
    }

    let floor = config.dispatch.min_battery_pct;
    if !(0..=100).contains(&floor) {
        warnings.push(
            ValidationWarning::new(
                "CONFIG_BATTERY_FLOOR_OUT_OF_RANGE",
                "dispatch.min_battery_pct must be within 0..=100",
            )
            .with_details(format!("value={floor}")),
        );
    }

    warnings
}

//! Fire intensity and severity scoring from environmental readings.
//!
//! Both scores are linear/threshold heuristics carried over from field practice, not a
//! validated fire behaviour model. Inputs are not range-checked here; callers that care
//! about physical plausibility run `validate::validate_readings` first.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{EnvironmentalReadings, Severity};

pub const INTENSITY_TEMPERATURE_WEIGHT: f64 = 0.6;
pub const INTENSITY_HUMIDITY_WEIGHT: f64 = -0.3;
pub const INTENSITY_WIND_WEIGHT: f64 = 0.7;

/// `max(0, 0.6*t - 0.3*h + 0.7*w)` with t in Celsius, h in percent, w in km/h.
///
/// Larger means more intense. Never negative for finite inputs; NaN propagates.
pub fn compute_intensity(temperature_c: f64, humidity_pct: f64, wind_speed_kmh: f64) -> f64 {
    let raw = INTENSITY_TEMPERATURE_WEIGHT * temperature_c
        + INTENSITY_HUMIDITY_WEIGHT * humidity_pct
        + INTENSITY_WIND_WEIGHT * wind_speed_kmh;
    if raw < 0.0 {
        0.0
    } else {
        raw
    }
}

/// One set of limits for the three severity inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSet {
    pub temperature_c: f64,
    pub smoke_level: f64,
    pub wind_speed_kmh: f64,
}

/// Limits for `classify_severity`. Comparisons are strict (`>`).
///
/// A config may name only some limits of a set; the rest keep their default values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeverityThresholds {
    /// All three must be exceeded for `high`.
    #[serde(deserialize_with = "high_over_defaults")]
    pub high: ThresholdSet,
    /// Any one exceeded gives `medium`.
    #[serde(deserialize_with = "medium_over_defaults")]
    pub medium: ThresholdSet,
}

pub const DEFAULT_HIGH: ThresholdSet = ThresholdSet {
    temperature_c: 100.0,
    smoke_level: 50.0,
    wind_speed_kmh: 10.0,
};

pub const DEFAULT_MEDIUM: ThresholdSet = ThresholdSet {
    temperature_c: 80.0,
    smoke_level: 30.0,
    wind_speed_kmh: 5.0,
};

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH,
            medium: DEFAULT_MEDIUM,
        }
    }
}

#[derive(Deserialize)]
struct PartialThresholdSet {
    temperature_c: Option<f64>,
    smoke_level: Option<f64>,
    wind_speed_kmh: Option<f64>,
}

impl PartialThresholdSet {
    fn over(self, base: ThresholdSet) -> ThresholdSet {
        ThresholdSet {
            temperature_c: self.temperature_c.unwrap_or(base.temperature_c),
            smoke_level: self.smoke_level.unwrap_or(base.smoke_level),
            wind_speed_kmh: self.wind_speed_kmh.unwrap_or(base.wind_speed_kmh),
        }
    }
}

fn high_over_defaults<'de, D: Deserializer<'de>>(d: D) -> Result<ThresholdSet, D::Error> {
    Ok(PartialThresholdSet::deserialize(d)?.over(DEFAULT_HIGH))
}

fn medium_over_defaults<'de, D: Deserializer<'de>>(d: D) -> Result<ThresholdSet, D::Error> {
    Ok(PartialThresholdSet::deserialize(d)?.over(DEFAULT_MEDIUM))
}

pub fn classify_severity(
    temperature_c: f64,
    smoke_level: f64,
    wind_speed_kmh: f64,
    thresholds: &SeverityThresholds,
) -> Severity {
    let high = &thresholds.high;
    let medium = &thresholds.medium;

    if temperature_c > high.temperature_c
        && smoke_level > high.smoke_level
        && wind_speed_kmh > high.wind_speed_kmh
    {
        Severity::High
    } else if temperature_c > medium.temperature_c
        || smoke_level > medium.smoke_level
        || wind_speed_kmh > medium.wind_speed_kmh
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Heat index in Celsius via the Rothfusz regression (Celsius coefficients).
///
/// Only meaningful roughly above 27 °C and 40 % humidity; returned as-is elsewhere.
pub fn heat_index_c(temperature_c: f64, humidity_pct: f64) -> f64 {
    const C1: f64 = -8.784_694_755_56;
    const C2: f64 = 1.611_394_11;
    const C3: f64 = 2.338_548_838_89;
    const C4: f64 = -0.146_116_05;
    const C5: f64 = -0.012_308_094;
    const C6: f64 = -0.016_424_827_777_8;
    const C7: f64 = 0.002_211_732;
    const C8: f64 = 0.000_725_46;
    const C9: f64 = -0.000_003_582;

    let t = temperature_c;
    let h = humidity_pct;

    C1 + C2 * t + C3 * h + C4 * t * h + C5 * t * t + C6 * h * h + C7 * t * t * h
        + C8 * t * h * h
        + C9 * t * t * h * h
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FireScore {
    pub intensity: f64,
    pub severity: Severity,
}

/// Score one reading. A missing smoke level counts as zero smoke.
pub fn score_readings(readings: &EnvironmentalReadings, thresholds: &SeverityThresholds) -> FireScore {
    FireScore {
        intensity: compute_intensity(
            readings.temperature_c,
            readings.humidity_pct,
            readings.wind_speed_kmh,
        ),
        severity: classify_severity(
            readings.temperature_c,
            readings.smoke_level.unwrap_or(0.0),
            readings.wind_speed_kmh,
            thresholds,
        ),
    }
}

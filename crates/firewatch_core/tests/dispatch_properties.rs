use std::collections::HashSet;

use firewatch_core::dispatch::{
    assign_units_to_incidents, find_nearest_unit, plan_dispatch, plan_with, DispatchConfig,
    GreedyNearest, MinTotalDistance, StrategyKind,
};
use firewatch_core::domain::{
    FireIncident, IncidentStatus, ResponseUnit, Severity, UnitKind, UnitStatus,
};
use firewatch_core::geo::{offset_north, GeoPoint};
use firewatch_core::scoring::{classify_severity, compute_intensity, SeverityThresholds};

const BASE: GeoPoint = GeoPoint {
    latitude: -33.8,
    longitude: 150.9,
};

fn incident(id: i64, location: Option<GeoPoint>) -> FireIncident {
    FireIncident {
        id,
        fingerprint: format!("fp-{id}"),
        description: None,
        location,
        status: IncidentStatus::Detected,
        severity: Severity::High,
        readings: None,
        intensity: None,
        detected_at: "2026-01-15T06:00:00Z".to_string(),
        ended_at: None,
        assigned_unit_id: None,
    }
}

fn unit(id: i64, location: Option<GeoPoint>) -> ResponseUnit {
    ResponseUnit {
        id,
        external_id: Some(format!("DR-{id}")),
        model: "FireHawk W2".to_string(),
        kind: UnitKind::Water,
        status: UnitStatus::Available,
        location,
        battery_pct: 80,
        payload_capacity: 40.0,
        current_incident_id: None,
    }
}

fn km(d: f64) -> Option<GeoPoint> {
    Some(offset_north(&BASE, d * 1_000.0))
}

/// Small linear congruential generator so the comparison sets are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn point(&mut self) -> GeoPoint {
        GeoPoint::new(
            BASE.latitude + (self.next_unit() - 0.5) * 0.4,
            BASE.longitude + (self.next_unit() - 0.5) * 0.4,
        )
    }
}

#[test]
fn nearest_of_one_five_ten_km() {
    let units = vec![unit(10, km(10.0)), unit(5, km(5.0)), unit(1, km(1.0))];
    let nearest = find_nearest_unit(&BASE, &units).expect("a drone");
    assert_eq!(nearest.id, 1);
}

#[test]
fn nearest_never_returns_a_drone_without_location() {
    // The unlocated drone is listed first; it must not win as distance zero.
    let units = vec![unit(1, None), unit(2, km(8.0))];
    let nearest = find_nearest_unit(&BASE, &units).expect("a located drone");
    assert_eq!(nearest.id, 2);
}

#[test]
fn nearest_over_unlocated_pool_is_none() {
    let units = vec![unit(1, None), unit(2, None)];
    assert!(find_nearest_unit(&BASE, &units).is_none());
}

#[test]
fn empty_pool_yields_nothing() {
    assert!(find_nearest_unit(&BASE, &[]).is_none());
    assert!(assign_units_to_incidents(&[incident(1, Some(BASE))], &[]).is_empty());
}

#[test]
fn same_input_same_plan() {
    let incidents = vec![incident(1, km(2.0)), incident(2, km(-3.0)), incident(3, km(7.0))];
    let units = vec![unit(10, km(0.0)), unit(11, km(6.0)), unit(12, km(-1.0))];
    let config = DispatchConfig::default();
    assert_eq!(
        plan_dispatch(&incidents, &units, &config),
        plan_dispatch(&incidents, &units, &config)
    );
}

#[test]
fn no_drone_is_assigned_twice() {
    let incidents: Vec<FireIncident> = (1..=6).map(|i| incident(i, km(i as f64))).collect();
    let units = vec![
        unit(10, km(1.5)),
        unit(11, km(3.5)),
        unit(10, km(1.5)),
        unit(12, km(5.5)),
    ];

    for strategy in [StrategyKind::Greedy, StrategyKind::MinTotalDistance] {
        let plan = plan_dispatch(
            &incidents,
            &units,
            &DispatchConfig {
                strategy,
                min_battery_pct: 0,
            },
        );
        let used: HashSet<i64> = plan.assignments.iter().map(|a| a.unit_id).collect();
        assert_eq!(used.len(), plan.assignments.len());
        assert_eq!(plan.assignments.len(), 3);
        assert_eq!(plan.unmatched_incident_ids.len(), 3);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.code == "DISPATCH_UNIT_DUPLICATE"));
    }
}

#[test]
fn records_without_location_are_skipped() {
    let incidents = vec![incident(1, None), incident(2, km(1.0))];
    let units = vec![unit(10, None), unit(11, km(4.0))];

    let plan = plan_with(&GreedyNearest, &incidents, &units, 0);
    assert_eq!(plan.assignments.len(), 1);
    assert_eq!(plan.assignments[0].incident_id, 2);
    assert_eq!(plan.assignments[0].unit_id, 11);

    let codes: Vec<&str> = plan.warnings.iter().map(|w| w.code.as_str()).collect();
    assert_eq!(
        codes,
        vec![
            "DISPATCH_INCIDENT_LOCATION_MISSING",
            "DISPATCH_UNIT_LOCATION_MISSING"
        ]
    );
}

#[test]
fn intensity_reference_values() {
    assert!((compute_intensity(30.0, 50.0, 10.0) - 10.0).abs() < 1e-9);
    assert_eq!(compute_intensity(0.0, 100.0, 0.0), 0.0);
    assert_eq!(compute_intensity(-20.0, 90.0, 0.0), 0.0);
}

#[test]
fn severity_uses_strict_thresholds() {
    let t = SeverityThresholds::default();
    assert_eq!(classify_severity(101.0, 51.0, 11.0, &t), Severity::High);
    // Exactly on the high line is not above it.
    assert_eq!(classify_severity(100.0, 51.0, 11.0, &t), Severity::Medium);
    assert_eq!(classify_severity(80.0, 30.0, 5.0, &t), Severity::Low);
    assert_eq!(classify_severity(20.0, 31.0, 0.0, &t), Severity::Medium);
}

#[test]
fn optimal_beats_greedy_on_the_classic_trap() {
    // Greedy gives the middle drone to incident 1 and sends the far drone to incident 2.
    let incidents = vec![incident(1, km(1.0)), incident(2, km(0.0))];
    let units = vec![unit(10, km(0.9)), unit(11, km(2.0))];

    let greedy = plan_with(&GreedyNearest, &incidents, &units, 0);
    let optimal = plan_with(&MinTotalDistance, &incidents, &units, 0);

    let pairs = |p: &firewatch_core::dispatch::DispatchPlan| -> Vec<(i64, i64)> {
        p.assignments.iter().map(|a| (a.incident_id, a.unit_id)).collect()
    };
    assert_eq!(pairs(&greedy), vec![(1, 10), (2, 11)]);
    assert_eq!(pairs(&optimal), vec![(1, 11), (2, 10)]);
    assert!((greedy.total_distance_m() - 2_100.0).abs() < 1.0);
    assert!((optimal.total_distance_m() - 1_900.0).abs() < 1.0);
}

#[test]
fn optimal_never_worse_than_greedy() {
    let mut rng = Lcg(0x5eed);
    for (n_incidents, n_units) in [(3, 3), (4, 7), (8, 5), (10, 10), (1, 6), (6, 1)] {
        for _ in 0..20 {
            let incidents: Vec<FireIncident> = (0..n_incidents)
                .map(|i| incident(i as i64 + 1, Some(rng.point())))
                .collect();
            let units: Vec<ResponseUnit> = (0..n_units)
                .map(|u| unit(u as i64 + 100, Some(rng.point())))
                .collect();

            let greedy = plan_with(&GreedyNearest, &incidents, &units, 0);
            let optimal = plan_with(&MinTotalDistance, &incidents, &units, 0);

            assert_eq!(greedy.assignments.len(), optimal.assignments.len());
            assert!(
                optimal.total_distance_m() <= greedy.total_distance_m() + 1e-6,
                "optimal {} > greedy {}",
                optimal.total_distance_m(),
                greedy.total_distance_m()
            );
        }
    }
}

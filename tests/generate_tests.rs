//! Generator invariants
//!
//! Seeded generation must be deterministic, structurally valid, and
//! skill-feasible; sampled values must stay inside the configured ranges.

use dispatch_planner::generate::{GenerateConfig, generate};

fn config() -> GenerateConfig {
    GenerateConfig {
        technicians: 3,
        orders: 6,
        skills: 2,
        shift_length: 400,
        max_shift_length: 500,
        ..GenerateConfig::default()
    }
}

#[test]
fn generation_is_deterministic_per_seed() {
    let a = generate(&config(), 77).unwrap();
    let b = generate(&config(), 77).unwrap();
    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[test]
fn generated_instances_validate() {
    for seed in [0, 1, 17, 231, 9999] {
        let instance = generate(&config(), seed).unwrap();
        instance.validate().unwrap();
        assert_eq!(instance.order_count(), 6);
        assert_eq!(instance.technician_count(), 3);
        // Retries only ever move the seed forward.
        assert!(instance.seed >= seed);
    }
}

#[test]
fn every_order_has_a_capable_technician() {
    for seed in [3, 42, 1000] {
        let instance = generate(&config(), seed).unwrap();
        for (i, order) in instance.orders.iter().enumerate() {
            let coverable = instance.technicians.iter().any(|tech| {
                order
                    .required_skills
                    .iter()
                    .zip(&tech.skills)
                    .all(|(&required, &has)| !required || has)
            });
            assert!(coverable, "order {i} has no capable technician (seed {seed})");
        }
    }
}

#[test]
fn sampled_values_stay_in_their_ranges() {
    let cfg = config();
    let instance = generate(&cfg, 55).unwrap();

    for order in &instance.orders {
        assert!(order.duration >= cfg.duration_min && order.duration < cfg.duration_max);
        assert!(order.earliest_start >= 0 && order.earliest_start < cfg.earliest_max);
        assert!(order.latest_end >= order.earliest_start + order.duration + cfg.slack_min);
        assert!(order.latest_end < order.earliest_start + order.duration + cfg.slack_max);
        assert!(
            order.lateness_penalty >= cfg.order_penalty_min
                && order.lateness_penalty < cfg.order_penalty_max
        );
    }
    for tech in &instance.technicians {
        assert!(
            tech.overtime_penalty >= cfg.tech_penalty_min
                && tech.overtime_penalty < cfg.tech_penalty_max
        );
        assert_eq!(tech.skills.len(), cfg.skills);
    }
    let w = instance.waypoint_count();
    for i in 0..w {
        for j in 0..w {
            assert!(instance.travel[i][j] <= 2 * (cfg.distance_max - 1));
        }
    }
}

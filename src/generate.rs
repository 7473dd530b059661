//! Seeded synthetic instance generation.
//!
//! Produces structurally valid instances for benchmarking. The one hard
//! invariant is skill feasibility: every order must have at least one
//! technician whose skill vector covers its requirements. Seeds failing the
//! check are retried with an incremented seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::instance::{Instance, Order, Technician};

/// How many incremented seeds to try before giving up on skill feasibility.
const MAX_SEED_RETRIES: u64 = 64;

/// Generation parameters. Counts and shift lengths are the basic knobs; the
/// remaining ranges are the sampling bounds exposed by the advanced mode.
/// Upper bounds are exclusive.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub technicians: usize,
    pub orders: usize,
    pub skills: usize,
    pub shift_length: i64,
    pub max_shift_length: i64,
    /// Raw distance draw bound; the matrix is symmetrised as `r + rᵀ`, so
    /// effective travel times range up to `2 * (distance_max - 1)`.
    pub distance_max: i64,
    pub duration_min: i64,
    pub duration_max: i64,
    pub earliest_max: i64,
    /// Deadline slack added on top of `earliest_start + duration`.
    pub slack_min: i64,
    pub slack_max: i64,
    pub order_penalty_min: i64,
    pub order_penalty_max: i64,
    pub tech_penalty_min: i64,
    pub tech_penalty_max: i64,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            technicians: 2,
            orders: 4,
            skills: 2,
            shift_length: 500,
            max_shift_length: 500,
            distance_max: 60,
            duration_min: 10,
            duration_max: 120,
            earliest_max: 120,
            slack_min: 30,
            slack_max: 120,
            order_penalty_min: 25,
            order_penalty_max: 300,
            tech_penalty_min: 5,
            tech_penalty_max: 20,
        }
    }
}

impl GenerateConfig {
    fn check(&self) -> Result<(), GenerateError> {
        if self.technicians == 0 || self.orders == 0 || self.skills == 0 {
            return Err(GenerateError::Invalid("counts must be positive"));
        }
        if self.shift_length <= 0 || self.max_shift_length < self.shift_length {
            return Err(GenerateError::Invalid("shift lengths out of order"));
        }
        if self.distance_max <= 0
            || self.duration_min <= 0
            || self.duration_min >= self.duration_max
            || self.earliest_max <= 0
            || self.slack_min >= self.slack_max
            || self.order_penalty_min >= self.order_penalty_max
            || self.tech_penalty_min >= self.tech_penalty_max
        {
            return Err(GenerateError::Invalid("empty sampling range"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid generation parameters: {0}")]
    Invalid(&'static str),
    #[error("no skill-feasible instance after {attempts} seeds (last seed {last_seed})")]
    SkillInfeasible { attempts: u64, last_seed: u64 },
}

/// Generate an instance from `seed`, retrying with incremented seeds until the
/// skill-feasibility invariant holds.
pub fn generate(config: &GenerateConfig, seed: u64) -> Result<Instance, GenerateError> {
    config.check()?;
    for attempt in 0..MAX_SEED_RETRIES {
        let current = seed + attempt;
        let instance = sample(config, current);
        if skill_feasible(&instance) {
            return Ok(instance);
        }
        tracing::warn!(seed = current, "generated data was inconsistent, retrying with next seed");
    }
    Err(GenerateError::SkillInfeasible {
        attempts: MAX_SEED_RETRIES,
        last_seed: seed + MAX_SEED_RETRIES - 1,
    })
}

fn sample(config: &GenerateConfig, seed: u64) -> Instance {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = config.orders;
    let m = config.technicians;
    let w = a + m;

    let raw: Vec<Vec<i64>> = (0..w)
        .map(|_| (0..w).map(|_| rng.gen_range(0..config.distance_max)).collect())
        .collect();
    let mut travel = vec![vec![0i64; w]; w];
    for i in 0..w {
        for j in 0..w {
            travel[i][j] = if i == j { 0 } else { raw[i][j] + raw[j][i] };
        }
    }

    let technician_skills: Vec<Vec<bool>> = (0..m)
        .map(|_| (0..config.skills).map(|_| rng.gen_range(0..2) == 1).collect())
        .collect();
    let order_skills: Vec<Vec<bool>> = (0..a)
        .map(|_| (0..config.skills).map(|_| rng.gen_range(0..2) == 1).collect())
        .collect();

    let durations: Vec<i64> = (0..a)
        .map(|_| rng.gen_range(config.duration_min..config.duration_max))
        .collect();
    let earliest: Vec<i64> = (0..a).map(|_| rng.gen_range(0..config.earliest_max)).collect();
    let deadlines: Vec<i64> = (0..a)
        .map(|i| earliest[i] + durations[i] + rng.gen_range(config.slack_min..config.slack_max))
        .collect();
    let order_penalties: Vec<i64> = (0..a)
        .map(|_| rng.gen_range(config.order_penalty_min..config.order_penalty_max))
        .collect();
    let tech_penalties: Vec<i64> = (0..m)
        .map(|_| rng.gen_range(config.tech_penalty_min..config.tech_penalty_max))
        .collect();

    Instance {
        technicians: (0..m)
            .map(|t| Technician {
                skills: technician_skills[t].clone(),
                overtime_penalty: tech_penalties[t],
            })
            .collect(),
        orders: (0..a)
            .map(|i| Order {
                duration: durations[i],
                earliest_start: earliest[i],
                latest_end: deadlines[i],
                lateness_penalty: order_penalties[i],
                required_skills: order_skills[i].clone(),
            })
            .collect(),
        travel,
        shift_length: config.shift_length,
        max_shift_length: config.max_shift_length,
        seed,
    }
}

/// Every order needs at least one technician whose skills are a superset of
/// the order's requirements.
fn skill_feasible(instance: &Instance) -> bool {
    instance.orders.iter().all(|order| {
        instance.technicians.iter().any(|tech| {
            order
                .required_skills
                .iter()
                .zip(&tech.skills)
                .all(|(&required, &has)| !required || has)
        })
    })
}

/// Draw the travel-time row for a waypoint inserted during replanning.
///
/// Entries are sampled independently per existing waypoint, mirroring the
/// symmetrised construction of the base matrix. The result is not derived
/// from any geometry and may violate the triangle inequality.
pub fn extension_distances(instance: &Instance, config: &GenerateConfig) -> Vec<i64> {
    tracing::warn!(
        seed = instance.seed,
        "extension distances are sampled independently; triangle inequality is not guaranteed"
    );
    let mut rng = StdRng::seed_from_u64(instance.seed + instance.waypoint_count() as u64);
    (0..instance.waypoint_count())
        .map(|_| rng.gen_range(0..config.distance_max) + rng.gen_range(0..config.distance_max))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_instance() {
        let config = GenerateConfig::default();
        let a = generate(&config, 42).unwrap();
        let b = generate(&config, 42).unwrap();
        assert_eq!(a.travel, b.travel);
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn test_matrix_symmetric_zero_diagonal() {
        let instance = generate(&GenerateConfig::default(), 9).unwrap();
        let w = instance.waypoint_count();
        for i in 0..w {
            assert_eq!(instance.travel[i][i], 0);
            for j in 0..w {
                assert_eq!(instance.travel[i][j], instance.travel[j][i]);
            }
        }
    }

    #[test]
    fn test_rejects_empty_range() {
        let config = GenerateConfig { duration_min: 120, duration_max: 120, ..GenerateConfig::default() };
        assert!(matches!(generate(&config, 1), Err(GenerateError::Invalid(_))));
    }
}

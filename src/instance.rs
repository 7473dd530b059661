//! Problem instance: technicians, orders, and the travel-time matrix.
//!
//! Waypoints are indexed `[0, A)` for orders and `[A, A+M)` for technician
//! depots, one depot per technician. An `Instance` is immutable for the
//! duration of a planning cycle; replanning produces a new value via
//! [`Instance::with_order`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fuel cost per travel-time unit, applied to every driven arc.
pub const FUEL_COST: f64 = 0.15;

/// Objective weight for order lateness and unserved-order penalties.
pub const WEIGHT_ORDER_PENALTY: f64 = 1000.0;
/// Objective weight for technician overtime penalties.
pub const WEIGHT_TECHNICIAN_PENALTY: f64 = 100.0;
/// Objective weight for transport cost.
pub const WEIGHT_TRANSPORT_COST: f64 = 1.0;

/// Fixed factor applied to an order's penalty rate when the order is not
/// scheduled at all, instead of a per-minute lateness penalty.
pub const UNSERVED_FACTOR: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technician {
    /// Skill-possession vector, one entry per skill.
    pub skills: Vec<bool>,
    /// Per-minute penalty rate for finishing past the nominal shift end.
    pub overtime_penalty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Service duration in minutes.
    pub duration: i64,
    /// Earliest clock time at which service may begin.
    pub earliest_start: i64,
    /// Soft deadline; ending later accrues `lateness_penalty` per minute.
    pub latest_end: i64,
    /// Per-minute lateness penalty rate.
    pub lateness_penalty: i64,
    /// Required-skill vector, one entry per skill.
    pub required_skills: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub technicians: Vec<Technician>,
    pub orders: Vec<Order>,
    /// Symmetric travel-time matrix over all waypoints, zero diagonal.
    pub travel: Vec<Vec<i64>>,
    /// Nominal shift length H; working past it accrues overtime.
    pub shift_length: i64,
    /// Hard workday cutoff H_max; no service may end after it.
    pub max_shift_length: i64,
    /// Seed the instance was generated from, echoed for reproducibility.
    pub seed: u64,
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("instance must have at least one technician and one order")]
    Empty,
    #[error("travel matrix must be {expected}x{expected}, got {rows}x{cols}")]
    MatrixShape { expected: usize, rows: usize, cols: usize },
    #[error("travel matrix is not symmetric at ({i},{j})")]
    MatrixAsymmetric { i: usize, j: usize },
    #[error("travel matrix diagonal must be zero at {i}")]
    MatrixDiagonal { i: usize },
    #[error("travel time at ({i},{j}) is negative")]
    NegativeTravel { i: usize, j: usize },
    #[error("skill vector width mismatch (expected {expected}, got {got})")]
    SkillWidth { expected: usize, got: usize },
    #[error("order {order} has invalid window or duration")]
    BadOrder { order: usize },
    #[error("shift length {shift} exceeds hard maximum {max}")]
    ShiftBounds { shift: i64, max: i64 },
    #[error("extension distance row has wrong length (expected {expected}, got {got})")]
    ExtensionLength { expected: usize, got: usize },
}

impl Instance {
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn technician_count(&self) -> usize {
        self.technicians.len()
    }

    pub fn waypoint_count(&self) -> usize {
        self.orders.len() + self.technicians.len()
    }

    pub fn skill_count(&self) -> usize {
        self.technicians.first().map_or(0, |t| t.skills.len())
    }

    /// Home depot waypoint of technician `m`.
    pub fn depot_of(&self, technician: usize) -> usize {
        self.orders.len() + technician
    }

    pub fn is_order(&self, waypoint: usize) -> bool {
        waypoint < self.orders.len()
    }

    /// Service duration at a waypoint; depots take no service time.
    pub fn duration_of(&self, waypoint: usize) -> i64 {
        if self.is_order(waypoint) {
            self.orders[waypoint].duration
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.technicians.is_empty() || self.orders.is_empty() {
            return Err(InstanceError::Empty);
        }
        if self.shift_length > self.max_shift_length {
            return Err(InstanceError::ShiftBounds {
                shift: self.shift_length,
                max: self.max_shift_length,
            });
        }

        let w = self.waypoint_count();
        if self.travel.len() != w {
            return Err(InstanceError::MatrixShape {
                expected: w,
                rows: self.travel.len(),
                cols: self.travel.first().map_or(0, Vec::len),
            });
        }
        for row in &self.travel {
            if row.len() != w {
                return Err(InstanceError::MatrixShape {
                    expected: w,
                    rows: self.travel.len(),
                    cols: row.len(),
                });
            }
        }
        for (i, row) in self.travel.iter().enumerate() {
            for (j, &t) in row.iter().enumerate() {
                if t < 0 {
                    return Err(InstanceError::NegativeTravel { i, j });
                }
                if t != self.travel[j][i] {
                    return Err(InstanceError::MatrixAsymmetric { i, j });
                }
            }
            if self.travel[i][i] != 0 {
                return Err(InstanceError::MatrixDiagonal { i });
            }
        }

        let skills = self.skill_count();
        for t in &self.technicians {
            if t.skills.len() != skills {
                return Err(InstanceError::SkillWidth {
                    expected: skills,
                    got: t.skills.len(),
                });
            }
        }
        for (i, o) in self.orders.iter().enumerate() {
            if o.required_skills.len() != skills {
                return Err(InstanceError::SkillWidth {
                    expected: skills,
                    got: o.required_skills.len(),
                });
            }
            if o.duration < 0 || o.earliest_start < 0 || o.lateness_penalty < 0 {
                return Err(InstanceError::BadOrder { order: i });
            }
        }
        Ok(())
    }

    /// Functional extension used by replanning: append `order` at index `A`
    /// (depots stay the trailing `M` waypoints) and splice one symmetric
    /// row/column into the travel matrix at the same position.
    ///
    /// `distances` holds the new waypoint's travel time to every existing
    /// waypoint, indexed in the *current* waypoint order.
    pub fn with_order(&self, order: Order, distances: &[i64]) -> Result<Instance, InstanceError> {
        let w = self.waypoint_count();
        if distances.len() != w {
            return Err(InstanceError::ExtensionLength {
                expected: w,
                got: distances.len(),
            });
        }
        if let Some(i) = distances.iter().position(|&d| d < 0) {
            return Err(InstanceError::NegativeTravel { i, j: w });
        }
        if order.required_skills.len() != self.skill_count() {
            return Err(InstanceError::SkillWidth {
                expected: self.skill_count(),
                got: order.required_skills.len(),
            });
        }

        let a = self.order_count();
        // Old waypoint `v` lands at `v` (orders) or `v + 1` (depots).
        let shift = |v: usize| if v < a { v } else { v + 1 };

        let mut travel = vec![vec![0i64; w + 1]; w + 1];
        for i in 0..w {
            for j in 0..w {
                travel[shift(i)][shift(j)] = self.travel[i][j];
            }
            travel[shift(i)][a] = distances[i];
            travel[a][shift(i)] = distances[i];
        }

        let mut orders = self.orders.clone();
        orders.push(order);

        let next = Instance {
            technicians: self.technicians.clone(),
            orders,
            travel,
            shift_length: self.shift_length,
            max_shift_length: self.max_shift_length,
            seed: self.seed,
        };
        next.validate()?;
        Ok(next)
    }
}

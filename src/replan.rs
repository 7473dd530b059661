//! Replanning: freeze the executed portion of a plan, extend the instance
//! with a newly arrived order, and re-solve with the commitments pinned.
//!
//! An arc counts as frozen when the technician had already departed for it
//! before the cutoff. Freezing is monotone in the cutoff: everything frozen
//! at `t1` is frozen at every `t2 > t1`.

use serde::Serialize;

use crate::extract::Routes;
use crate::instance::{Instance, InstanceError, Order};
use crate::solve::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrozenArc {
    pub technician: usize,
    pub from: usize,
    pub to: usize,
}

/// The irrevocably committed portion of a solved plan.
#[derive(Debug, Clone, Serialize)]
pub struct FrozenPlan {
    pub arcs: Vec<FrozenArc>,
    /// Pinned start times for frozen order waypoints.
    pub starts: Vec<(usize, i64)>,
    pub cutoff: i64,
}

/// Walk the extracted routes and collect every arc whose departure time from
/// its source waypoint lies strictly before `cutoff`, together with the
/// realized start times of the orders those arcs reach.
pub fn freeze(
    instance: &Instance,
    routes: &Routes,
    assignment: &Assignment,
    cutoff: i64,
) -> FrozenPlan {
    let mut arcs = Vec::new();
    let mut starts = Vec::new();

    for (m, tour) in routes.tours.iter().enumerate() {
        for pair in tour.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let departure = assignment.starts[from] + instance.duration_of(from);
            if departure >= cutoff {
                break;
            }
            arcs.push(FrozenArc { technician: m, from, to });
            if instance.is_order(to) {
                starts.push((to, assignment.starts[to]));
            }
        }
    }

    tracing::info!(cutoff, frozen_arcs = arcs.len(), "plan frozen");
    FrozenPlan { arcs, starts, cutoff }
}

impl FrozenPlan {
    /// Remap waypoint indices across an order insertion at index `a`:
    /// order indices are unchanged, depot indices shift up by one.
    fn remapped(&self, a: usize) -> FrozenPlan {
        let shift = |v: usize| if v < a { v } else { v + 1 };
        FrozenPlan {
            arcs: self
                .arcs
                .iter()
                .map(|arc| FrozenArc {
                    technician: arc.technician,
                    from: shift(arc.from),
                    to: shift(arc.to),
                })
                .collect(),
            starts: self.starts.iter().map(|&(w, t)| (shift(w), t)).collect(),
            cutoff: self.cutoff,
        }
    }
}

/// Extend `instance` with `new_order` and carry the frozen plan into the
/// extended index space. The caller re-runs model building with the returned
/// plan as hard commitments.
pub fn apply(
    instance: &Instance,
    frozen: &FrozenPlan,
    new_order: Order,
    distances: &[i64],
) -> Result<(Instance, FrozenPlan), InstanceError> {
    let extended = instance.with_order(new_order, distances)?;
    let remapped = frozen.remapped(instance.order_count());
    Ok((extended, remapped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::instance::Technician;
    use crate::solve::SolveStatus;
    use std::time::Duration;

    /// One technician, two orders, tour depot → 0 → 1 → depot with starts
    /// 20 and 60.
    fn fixture() -> (Instance, Assignment) {
        let order = |earliest: i64| Order {
            duration: 15,
            earliest_start: earliest,
            latest_end: 200,
            lateness_penalty: 10,
            required_skills: vec![false],
        };
        let instance = Instance {
            technicians: vec![Technician { skills: vec![true], overtime_penalty: 1 }],
            orders: vec![order(10), order(30)],
            travel: vec![
                vec![0, 5, 20],
                vec![5, 0, 12],
                vec![20, 12, 0],
            ],
            shift_length: 150,
            max_shift_length: 250,
            seed: 0,
        };
        let assignment = Assignment {
            status: SolveStatus::Optimal,
            arcs: vec![(0, 2, 0), (0, 0, 1), (0, 1, 2)],
            starts: vec![20, 60, 0],
            objective: 0.0,
            kpis: Vec::new(),
            solve_time: Duration::ZERO,
            budget: Duration::ZERO,
        };
        (instance, assignment)
    }

    #[test]
    fn test_freeze_cuts_at_departure_time() {
        let (instance, assignment) = fixture();
        let routes = extract(&instance, &assignment).unwrap();

        // Departures: depot at 0, order 0 at 35, order 1 at 75.
        let frozen = freeze(&instance, &routes, &assignment, 40);
        assert_eq!(
            frozen.arcs,
            vec![
                FrozenArc { technician: 0, from: 2, to: 0 },
                FrozenArc { technician: 0, from: 0, to: 1 },
            ]
        );
        assert_eq!(frozen.starts, vec![(0, 20), (1, 60)]);

        // Strictly-before: a cutoff equal to a departure leaves it free.
        let at_departure = freeze(&instance, &routes, &assignment, 35);
        assert_eq!(at_departure.arcs.len(), 1);
    }

    #[test]
    fn test_freeze_is_monotone_in_cutoff() {
        let (instance, assignment) = fixture();
        let routes = extract(&instance, &assignment).unwrap();
        let mut previous = 0;
        for cutoff in [0, 1, 35, 36, 75, 76, 1000] {
            let frozen = freeze(&instance, &routes, &assignment, cutoff);
            assert!(frozen.arcs.len() >= previous);
            previous = frozen.arcs.len();
        }
    }

    #[test]
    fn test_apply_remaps_depot_indices() {
        let (instance, assignment) = fixture();
        let routes = extract(&instance, &assignment).unwrap();
        let frozen = freeze(&instance, &routes, &assignment, 40);

        let new_order = Order {
            duration: 10,
            earliest_start: 50,
            latest_end: 120,
            lateness_penalty: 5,
            required_skills: vec![false],
        };
        let (extended, remapped) = apply(&instance, &frozen, new_order, &[7, 9, 11]).unwrap();

        assert_eq!(extended.order_count(), 3);
        // The depot moved from waypoint 2 to waypoint 3.
        assert_eq!(
            remapped.arcs[0],
            FrozenArc { technician: 0, from: 3, to: 0 }
        );
        // Order waypoints and pinned times are untouched.
        assert_eq!(remapped.starts, vec![(0, 20), (1, 60)]);
    }
}

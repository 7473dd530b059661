//! Route reconstruction from a raw arc assignment.
//!
//! Turns the solver's flat arc set into ordered per-technician tours by
//! following successor arcs from each depot. A correct constraint set always
//! yields closed tours; anything else is a model defect and aborts the cycle.

use std::collections::HashMap;

use thiserror::Error;

use crate::instance::Instance;
use crate::solve::Assignment;

/// Ordered tours plus the served/unserved order partition.
#[derive(Debug, Clone)]
pub struct Routes {
    /// One waypoint sequence per technician, depot at both ends. A
    /// technician that never departs gets just its depot.
    pub tours: Vec<Vec<usize>>,
    pub served: Vec<usize>,
    pub unserved: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("technician {technician}: no outbound arc from waypoint {waypoint}")]
    MissingSuccessor { technician: usize, waypoint: usize },
    #[error("technician {technician}: multiple outbound arcs from waypoint {waypoint}")]
    BranchingRoute { technician: usize, waypoint: usize },
    #[error("technician {technician}: route did not close within {limit} hops")]
    OpenChain { technician: usize, limit: usize },
}

pub fn extract(instance: &Instance, assignment: &Assignment) -> Result<Routes, ExtractionError> {
    let mut successors: Vec<HashMap<usize, usize>> =
        vec![HashMap::new(); instance.technician_count()];
    for &(m, i, j) in &assignment.arcs {
        if successors[m].insert(i, j).is_some() {
            return Err(ExtractionError::BranchingRoute { technician: m, waypoint: i });
        }
    }

    // Every tour must close within A+1 hops: each order at most once, plus
    // the return leg.
    let limit = instance.order_count() + 1;

    let mut tours = Vec::with_capacity(instance.technician_count());
    for m in 0..instance.technician_count() {
        let depot = instance.depot_of(m);
        let mut tour = vec![depot];
        if successors[m].contains_key(&depot) {
            let mut current = depot;
            loop {
                if tour.len() > limit {
                    return Err(ExtractionError::OpenChain { technician: m, limit });
                }
                let next = *successors[m]
                    .get(&current)
                    .ok_or(ExtractionError::MissingSuccessor { technician: m, waypoint: current })?;
                tour.push(next);
                current = next;
                if current == depot {
                    break;
                }
            }
        }
        tours.push(tour);
    }

    let mut served = Vec::new();
    let mut unserved = Vec::new();
    for i in 0..instance.order_count() {
        if assignment.starts[i] > 0 {
            served.push(i);
        } else {
            unserved.push(i);
        }
    }

    tracing::debug!(served = served.len(), unserved = unserved.len(), "routes extracted");
    Ok(Routes { tours, served, unserved })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Order, Technician};
    use crate::solve::SolveStatus;
    use std::time::Duration;

    fn fixture(arcs: Vec<(usize, usize, usize)>, starts: Vec<i64>) -> (Instance, Assignment) {
        let order = |skills: Vec<bool>| Order {
            duration: 10,
            earliest_start: 0,
            latest_end: 100,
            lateness_penalty: 1,
            required_skills: skills,
        };
        let instance = Instance {
            technicians: vec![Technician { skills: vec![true], overtime_penalty: 1 }],
            orders: vec![order(vec![false]), order(vec![false])],
            travel: vec![
                vec![0, 5, 8],
                vec![5, 0, 3],
                vec![8, 3, 0],
            ],
            shift_length: 100,
            max_shift_length: 150,
            seed: 0,
        };
        let assignment = Assignment {
            status: SolveStatus::Optimal,
            arcs,
            starts,
            objective: 0.0,
            kpis: Vec::new(),
            solve_time: Duration::ZERO,
            budget: Duration::ZERO,
        };
        (instance, assignment)
    }

    #[test]
    fn test_closed_tour_reconstructed_in_order() {
        let (instance, assignment) =
            fixture(vec![(0, 2, 1), (0, 1, 0), (0, 0, 2)], vec![20, 8, 0]);
        let routes = extract(&instance, &assignment).unwrap();
        assert_eq!(routes.tours, vec![vec![2, 1, 0, 2]]);
        assert_eq!(routes.served, vec![0, 1]);
        assert!(routes.unserved.is_empty());
    }

    #[test]
    fn test_stationary_technician_keeps_depot_only() {
        let (instance, assignment) = fixture(Vec::new(), vec![0, 0, 0]);
        let routes = extract(&instance, &assignment).unwrap();
        assert_eq!(routes.tours, vec![vec![2]]);
        assert_eq!(routes.unserved, vec![0, 1]);
    }

    #[test]
    fn test_open_chain_is_rejected() {
        let (instance, assignment) = fixture(vec![(0, 2, 0)], vec![10, 0, 0]);
        let result = extract(&instance, &assignment);
        assert!(matches!(result, Err(ExtractionError::MissingSuccessor { .. })));
    }

    #[test]
    fn test_branching_route_is_rejected() {
        let (instance, assignment) =
            fixture(vec![(0, 2, 0), (0, 2, 1)], vec![10, 10, 0]);
        let result = extract(&instance, &assignment);
        assert!(matches!(result, Err(ExtractionError::BranchingRoute { .. })));
    }
}

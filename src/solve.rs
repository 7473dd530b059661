//! Solver adapter boundary and the embedded MILP backend.
//!
//! The adapter is the only blocking call in a planning cycle and is always
//! invoked with an explicit wall-clock budget. A budget expiry with an
//! incumbent reports [`SolveStatus::Feasible`] and is treated exactly like
//! [`SolveStatus::Optimal`] downstream; the distinction is observability only.

use std::time::{Duration, Instant};

use good_lp::{
    Expression, ResolutionError, Solution, SolverModel, Variable, constraint, default_solver,
    variable, variables,
};
use thiserror::Error;

use crate::model::{Cmp, Constraint, LinExpr, LinearConstraint, Model, VarKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// Best incumbent at budget expiry; as good as optimal for callers.
    Feasible,
}

/// A decoded variable assignment for one solved model.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub status: SolveStatus,
    /// Chosen arcs `(technician, from, to)`.
    pub arcs: Vec<(usize, usize, usize)>,
    /// Start time per waypoint; depots are always 0.
    pub starts: Vec<i64>,
    pub objective: f64,
    /// Unweighted KPI values, in model order.
    pub kpis: Vec<(&'static str, f64)>,
    pub solve_time: Duration,
    pub budget: Duration,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("model proven infeasible")]
    Infeasible,
    #[error("no solution found within the time budget")]
    NoSolution,
    #[error("solver backend failure: {0}")]
    Backend(String),
}

/// External solving engine boundary. Implementations accept a model and a
/// time budget and return the best assignment they can prove or find.
pub trait SolverAdapter {
    fn solve(&self, model: &Model, budget: Duration) -> Result<Assignment, SolveError>;
}

/// Embedded MILP backend on top of `good_lp`.
///
/// Implications are lowered to big-M rows with M derived per constraint from
/// the row's own variable bounds, never a shared global constant. The
/// pure-Rust backend solves to optimality or proven infeasibility; it has no
/// incumbent notion, so the budget is recorded for diagnostics and a
/// budget-honoring engine can be swapped in behind the same trait.
#[derive(Debug, Default)]
pub struct MilpSolver;

impl SolverAdapter for MilpSolver {
    fn solve(&self, model: &Model, budget: Duration) -> Result<Assignment, SolveError> {
        let started = Instant::now();

        let mut vars = variables!();
        let handles: Vec<Variable> = model
            .kinds()
            .iter()
            .map(|kind| match *kind {
                VarKind::Binary => vars.add(variable().binary()),
                VarKind::Integer { min, max } => {
                    vars.add(variable().integer().min(min as f64).max(max as f64))
                }
            })
            .collect();

        let objective = to_expression(&model.objective(), &handles);
        let mut problem = vars.minimise(objective).using(default_solver);

        for c in &model.constraints {
            match c {
                Constraint::Linear(row) => {
                    problem = problem.with(to_row(row, &handles));
                }
                Constraint::Implication { var, active, then } => {
                    for (expr, rhs) in le_rows(then) {
                        let slack = big_m(model, &expr, rhs);
                        if slack <= 0.0 {
                            // The row holds for every assignment; nothing to gate.
                            continue;
                        }
                        let mut gated = expr;
                        let (coefficient, shift) = if *active {
                            (slack, slack)
                        } else {
                            (-slack, 0.0)
                        };
                        gated.terms.push((*var, coefficient));
                        problem = problem.with(to_row(
                            &LinearConstraint::le(gated, rhs + shift),
                            &handles,
                        ));
                    }
                }
            }
        }

        match problem.solve() {
            Ok(solution) => {
                let value = |var: crate::model::VarId| solution.value(handles[var.0]);

                let mut arcs = Vec::new();
                for m in 0..model.technician_count() {
                    for i in 0..model.waypoint_count() {
                        for j in 0..model.waypoint_count() {
                            if value(model.arc(m, i, j)) > 0.5 {
                                arcs.push((m, i, j));
                            }
                        }
                    }
                }
                let starts: Vec<i64> = (0..model.waypoint_count())
                    .map(|w| value(model.start(w)).round() as i64)
                    .collect();
                let kpis: Vec<(&'static str, f64)> = model
                    .kpis
                    .iter()
                    .map(|kpi| (kpi.name, evaluate(&kpi.expr, &value)))
                    .collect();
                let objective = evaluate(&model.objective(), &value);

                let solve_time = started.elapsed();
                tracing::info!(
                    objective,
                    arcs = arcs.len(),
                    ?solve_time,
                    "solve finished (optimal)"
                );
                Ok(Assignment {
                    status: SolveStatus::Optimal,
                    arcs,
                    starts,
                    objective,
                    kpis,
                    solve_time,
                    budget,
                })
            }
            Err(ResolutionError::Infeasible) => Err(SolveError::Infeasible),
            Err(other) => Err(SolveError::Backend(other.to_string())),
        }
    }
}

fn to_expression(expr: &LinExpr, handles: &[Variable]) -> Expression {
    let mut e = Expression::from(expr.constant);
    for &(var, coefficient) in &expr.terms {
        e += handles[var.0] * coefficient;
    }
    e
}

fn to_row(row: &LinearConstraint, handles: &[Variable]) -> good_lp::Constraint {
    let lhs = to_expression(&row.expr, handles);
    let rhs = row.rhs;
    match row.cmp {
        Cmp::Le => constraint!(lhs <= rhs),
        Cmp::Ge => constraint!(lhs >= rhs),
        Cmp::Eq => constraint!(lhs == rhs),
    }
}

/// Normalise a constraint into one or two `expr ≤ rhs` rows.
fn le_rows(row: &LinearConstraint) -> Vec<(LinExpr, f64)> {
    match row.cmp {
        Cmp::Le => vec![(row.expr.clone(), row.rhs)],
        Cmp::Ge => vec![(negated(&row.expr), -row.rhs)],
        Cmp::Eq => vec![
            (row.expr.clone(), row.rhs),
            (negated(&row.expr), -row.rhs),
        ],
    }
}

fn negated(expr: &LinExpr) -> LinExpr {
    LinExpr {
        terms: expr.terms.iter().map(|&(v, c)| (v, -c)).collect(),
        constant: -expr.constant,
    }
}

/// Tightest valid big-M for gating `expr ≤ rhs`: the largest value the left
/// side can take over the variable bounds, minus the right side.
fn big_m(model: &Model, expr: &LinExpr, rhs: f64) -> f64 {
    let mut worst = expr.constant;
    for &(var, coefficient) in &expr.terms {
        let (lo, hi) = model.bounds(var);
        worst += coefficient * if coefficient >= 0.0 { hi } else { lo };
    }
    worst - rhs
}

fn evaluate(expr: &LinExpr, value: &impl Fn(crate::model::VarId) -> f64) -> f64 {
    expr.constant
        + expr
            .terms
            .iter()
            .map(|&(var, coefficient)| coefficient * value(var))
            .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Instance, Order, Technician};
    use crate::model::build;

    fn one_order() -> Instance {
        Instance {
            technicians: vec![Technician { skills: vec![true], overtime_penalty: 5 }],
            orders: vec![Order {
                duration: 30,
                earliest_start: 10,
                latest_end: 120,
                lateness_penalty: 50,
                required_skills: vec![true],
            }],
            travel: vec![vec![0, 15], vec![15, 0]],
            shift_length: 200,
            max_shift_length: 300,
            seed: 3,
        }
    }

    #[test]
    fn test_big_m_uses_variable_bounds() {
        let model = build(&one_order());
        // start(0) - start(1) ≤ 0 can exceed the bound by at most H_max.
        let expr = LinExpr::term(model.start(0), 1.0).with(model.start(1), -1.0);
        assert_eq!(big_m(&model, &expr, 0.0), 300.0);
    }

    #[test]
    fn test_single_order_is_scheduled() {
        let instance = one_order();
        let model = build(&instance);
        let assignment = MilpSolver
            .solve(&model, Duration::from_secs(10))
            .expect("tiny model must solve");

        // The unserved penalty dwarfs travel cost, so the tour runs
        // depot → order → depot.
        assert!(assignment.arcs.contains(&(0, 1, 0)));
        assert!(assignment.arcs.contains(&(0, 0, 1)));
        assert_eq!(assignment.arcs.len(), 2);
        assert!(assignment.starts[0] >= 10);
        assert_eq!(assignment.starts[1], 0);
    }
}

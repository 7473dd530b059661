//! Decision-model construction: variables, constraints, objective.
//!
//! `build` is a pure function of the instance. The produced model uses only
//! linear (in)equalities and single-literal implications (`var = 0/1` implies
//! a linear row), so any MILP backend with indicator or big-M support can
//! consume it through the solver adapter.

use crate::instance::{
    FUEL_COST, Instance, UNSERVED_FACTOR, WEIGHT_ORDER_PENALTY, WEIGHT_TECHNICIAN_PENALTY,
    WEIGHT_TRANSPORT_COST,
};
use crate::replan::FrozenPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

#[derive(Debug, Clone, Copy)]
pub enum VarKind {
    Binary,
    Integer { min: i64, max: i64 },
}

/// Linear expression `Σ coefficient·var + constant`.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn term(var: VarId, coefficient: f64) -> Self {
        Self { terms: vec![(var, coefficient)], constant: 0.0 }
    }

    pub fn with(mut self, var: VarId, coefficient: f64) -> Self {
        self.terms.push((var, coefficient));
        self
    }

    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1.0)).collect(),
            constant: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub expr: LinExpr,
    pub cmp: Cmp,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn le(expr: LinExpr, rhs: f64) -> Self {
        Self { expr, cmp: Cmp::Le, rhs }
    }

    pub fn ge(expr: LinExpr, rhs: f64) -> Self {
        Self { expr, cmp: Cmp::Ge, rhs }
    }

    pub fn eq(expr: LinExpr, rhs: f64) -> Self {
        Self { expr, cmp: Cmp::Eq, rhs }
    }
}

#[derive(Debug, Clone)]
pub enum Constraint {
    Linear(LinearConstraint),
    /// `var = active` implies `then` holds; inactive leaves it unconstrained.
    Implication {
        var: VarId,
        active: bool,
        then: LinearConstraint,
    },
}

/// One objective term, exposed independently for observability.
#[derive(Debug, Clone)]
pub struct Kpi {
    pub name: &'static str,
    pub weight: f64,
    pub expr: LinExpr,
}

#[derive(Debug, Clone)]
pub struct Model {
    kinds: Vec<VarKind>,
    pub constraints: Vec<Constraint>,
    pub kpis: Vec<Kpi>,
    technicians: usize,
    orders: usize,
    waypoints: usize,
    start_base: usize,
    served_base: usize,
    lateness_base: usize,
    overtime_base: usize,
}

impl Model {
    /// Travel decision: technician `m` drives directly from `i` to `j`.
    pub fn arc(&self, m: usize, i: usize, j: usize) -> VarId {
        VarId((m * self.waypoints + i) * self.waypoints + j)
    }

    /// Clock time at which service at waypoint `w` begins.
    pub fn start(&self, w: usize) -> VarId {
        VarId(self.start_base + w)
    }

    /// Reification of "order `i` has a strictly positive start time".
    pub fn served(&self, i: usize) -> VarId {
        VarId(self.served_base + i)
    }

    pub fn lateness(&self, i: usize) -> VarId {
        VarId(self.lateness_base + i)
    }

    pub fn overtime(&self, m: usize, i: usize) -> VarId {
        VarId(self.overtime_base + m * self.orders + i)
    }

    pub fn kinds(&self) -> &[VarKind] {
        &self.kinds
    }

    pub fn technician_count(&self) -> usize {
        self.technicians
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints
    }

    pub fn order_count(&self) -> usize {
        self.orders
    }

    /// Lower/upper bounds of a variable, as the backend sees them.
    pub fn bounds(&self, var: VarId) -> (f64, f64) {
        match self.kinds[var.0] {
            VarKind::Binary => (0.0, 1.0),
            VarKind::Integer { min, max } => (min as f64, max as f64),
        }
    }

    /// The minimised objective: weighted sum of all KPIs.
    pub fn objective(&self) -> LinExpr {
        let mut expr = LinExpr::default();
        for kpi in &self.kpis {
            expr.constant += kpi.weight * kpi.expr.constant;
            for &(var, coefficient) in &kpi.expr.terms {
                expr.terms.push((var, kpi.weight * coefficient));
            }
        }
        expr
    }

    fn le(&mut self, expr: LinExpr, rhs: f64) {
        self.constraints.push(Constraint::Linear(LinearConstraint::le(expr, rhs)));
    }

    fn ge(&mut self, expr: LinExpr, rhs: f64) {
        self.constraints.push(Constraint::Linear(LinearConstraint::ge(expr, rhs)));
    }

    fn eq(&mut self, expr: LinExpr, rhs: f64) {
        self.constraints.push(Constraint::Linear(LinearConstraint::eq(expr, rhs)));
    }

    fn imply(&mut self, var: VarId, active: bool, then: LinearConstraint) {
        self.constraints.push(Constraint::Implication { var, active, then });
    }

    /// Pin a frozen arc to 1 (hard equality on top of the base constraints).
    pub fn pin_arc(&mut self, m: usize, i: usize, j: usize) {
        let var = self.arc(m, i, j);
        self.eq(LinExpr::term(var, 1.0), 1.0);
    }

    /// Pin a frozen order's start time to its already-realized value.
    pub fn pin_start(&mut self, w: usize, time: i64) {
        let var = self.start(w);
        self.eq(LinExpr::term(var, 1.0), time as f64);
    }
}

/// Build the full constraint set and objective for `instance`.
pub fn build(instance: &Instance) -> Model {
    let a = instance.order_count();
    let m_count = instance.technician_count();
    let w = instance.waypoint_count();
    let h = instance.shift_length;
    let h_max = instance.max_shift_length;

    let mut kinds = Vec::with_capacity(m_count * w * w + w + 3 * a + m_count * a);
    kinds.resize(m_count * w * w, VarKind::Binary);
    let start_base = kinds.len();
    kinds.resize(start_base + w, VarKind::Integer { min: 0, max: h_max });
    let served_base = kinds.len();
    kinds.resize(served_base + a, VarKind::Binary);
    let lateness_base = kinds.len();
    kinds.resize(lateness_base + a, VarKind::Integer { min: 0, max: h_max });
    let overtime_base = kinds.len();
    // Overtime epigraph must reach both the latest finish time and the
    // longest travel leg.
    let travel_peak = instance.travel.iter().flatten().copied().max().unwrap_or(0);
    kinds.resize(
        overtime_base + m_count * a,
        VarKind::Integer { min: 0, max: h_max.max(travel_peak) },
    );

    let mut model = Model {
        kinds,
        constraints: Vec::new(),
        kpis: Vec::new(),
        technicians: m_count,
        orders: a,
        waypoints: w,
        start_base,
        served_base,
        lateness_base,
        overtime_base,
    };

    // Depot isolation: no technician touches a depot it does not own.
    for m in 0..m_count {
        for t in 0..m_count {
            if t == m {
                continue;
            }
            let foreign = instance.depot_of(t);
            for i in 0..w {
                model.eq(LinExpr::term(model.arc(m, i, foreign), 1.0), 0.0);
            }
            for j in 0..w {
                model.eq(LinExpr::term(model.arc(m, foreign, j), 1.0), 0.0);
            }
        }
    }

    // No self-loops.
    for m in 0..m_count {
        for v in 0..w {
            model.eq(LinExpr::term(model.arc(m, v, v), 1.0), 0.0);
        }
    }

    // At most one departure from and one return to the own depot, and the
    // two must match so a route is a closed loop, never a dangling departure.
    for m in 0..m_count {
        let depot = instance.depot_of(m);
        let out = LinExpr::sum((0..a).map(|j| model.arc(m, depot, j)));
        let back = LinExpr::sum((0..a).map(|j| model.arc(m, j, depot)));
        model.le(out.clone(), 1.0);
        model.le(back.clone(), 1.0);
        let mut balance = out;
        for &(var, _) in &back.terms {
            balance.terms.push((var, -1.0));
        }
        model.eq(balance, 0.0);
    }

    // Depot anchoring: any used arc implies the technician actually departed
    // from its own depot, and that some arc returns there.
    for m in 0..m_count {
        let depot = instance.depot_of(m);
        for i in 0..w {
            for j in 0..a {
                let mut row = LinExpr::term(model.arc(m, i, j), 1.0);
                for t in 0..a {
                    row.terms.push((model.arc(m, depot, t), -1.0));
                }
                model.le(row, 0.0);
            }
        }
        for i in 0..w {
            if !(instance.is_order(i) || i == depot) {
                continue;
            }
            for j in 0..a {
                if i == j {
                    continue;
                }
                let mut row = LinExpr::term(model.arc(m, i, j), 1.0);
                for t in 0..a {
                    if t != i {
                        row.terms.push((model.arc(m, t, depot), -1.0));
                    }
                }
                model.le(row, 0.0);
            }
        }
    }

    // Degree bound: at most one outbound arc per waypoint and technician.
    for m in 0..m_count {
        for j in 0..w {
            if j == instance.depot_of(m) {
                continue;
            }
            model.le(LinExpr::sum((0..w).map(|k| model.arc(m, j, k))), 1.0);
        }
    }

    // Arc coverage: leaving an order requires having reached it first.
    for m in 0..m_count {
        for j in 0..a {
            for l in 0..w {
                if l == j {
                    continue;
                }
                let mut row = LinExpr::term(model.arc(m, j, l), 1.0);
                for t in 0..w {
                    if t != j && t != l {
                        row.terms.push((model.arc(m, t, j), -1.0));
                    }
                }
                model.le(row, 0.0);
            }
        }
    }

    // Coverage policy: a started order is reached exactly once across all
    // technicians; an unstarted order is never reached. Conditional by
    // design, so an over-constrained instance degrades to penalized drops
    // instead of infeasibility.
    for i in 0..a {
        let inbound = LinExpr::sum(
            (0..m_count).flat_map(|m| (0..w).map(move |j| (m, j))).map(|(m, j)| model.arc(m, j, i)),
        );
        let served = model.served(i);
        model.imply(served, true, LinearConstraint::eq(inbound.clone(), 1.0));
        model.imply(served, false, LinearConstraint::le(inbound, 0.0));

        let earliest = instance.orders[i].earliest_start.max(1);
        let start = model.start(i);
        model.imply(served, true, LinearConstraint::ge(LinExpr::term(start, 1.0), earliest as f64));
        model.imply(served, false, LinearConstraint::le(LinExpr::term(start, 1.0), 0.0));
    }

    // Hard workday cutoff.
    for i in 0..a {
        model.le(
            LinExpr::term(model.start(i), 1.0),
            (h_max - instance.orders[i].duration) as f64,
        );
    }

    // Depot start times are pinned to zero by convention.
    for m in 0..m_count {
        model.eq(LinExpr::term(model.start(instance.depot_of(m)), 1.0), 0.0);
    }

    // Time propagation along chosen arcs.
    for m in 0..m_count {
        for i in 0..w {
            for j in 0..a {
                if i == j {
                    continue;
                }
                let gap = instance.duration_of(i) + instance.travel[i][j];
                let row = LinExpr::term(model.start(j), 1.0).with(model.start(i), -1.0);
                model.imply(
                    model.arc(m, i, j),
                    true,
                    LinearConstraint::ge(row, gap as f64),
                );
            }
        }
    }

    // Returning home must still fit inside the hard cutoff.
    for m in 0..m_count {
        let depot = instance.depot_of(m);
        for i in 0..a {
            let latest = h_max - instance.orders[i].duration - instance.travel[i][depot];
            model.imply(
                model.arc(m, i, depot),
                true,
                LinearConstraint::le(LinExpr::term(model.start(i), 1.0), latest as f64),
            );
        }
    }

    // Skill compatibility, with the arc variable as indicator:
    // required - (1 - x) ≤ possessed.
    for m in 0..m_count {
        for i in 0..a {
            for j in 0..w {
                for s in 0..instance.skill_count() {
                    let required = instance.orders[i].required_skills[s] as i64;
                    let has = instance.technicians[m].skills[s] as i64;
                    model.le(
                        LinExpr::term(model.arc(m, i, j), 1.0),
                        (1 - required + has) as f64,
                    );
                }
            }
        }
    }

    // Lateness epigraph: lateness_i ≥ start_i + duration_i - latest_end_i.
    for i in 0..a {
        let order = &instance.orders[i];
        let row = LinExpr::term(model.lateness(i), 1.0).with(model.start(i), -1.0);
        model.ge(row, (order.duration - order.latest_end) as f64);
    }

    // Overtime epigraph, gated by the return arc: when technician m heads
    // home from order i, overtime_{m,i} ≥ max(0, finish, travel_home - H).
    for m in 0..m_count {
        let depot = instance.depot_of(m);
        for i in 0..a {
            let over = model.overtime(m, i);
            let gate = model.arc(m, i, depot);
            let finish = LinExpr::term(over, 1.0).with(model.start(i), -1.0);
            model.imply(gate, true, LinearConstraint::ge(finish, instance.orders[i].duration as f64));
            model.imply(
                gate,
                true,
                LinearConstraint::ge(
                    LinExpr::term(over, 1.0),
                    (instance.travel[i][depot] - h) as f64,
                ),
            );
        }
    }

    // Objective KPIs.
    let mut lateness = LinExpr::default();
    for i in 0..a {
        lateness.terms.push((model.lateness(i), instance.orders[i].lateness_penalty as f64));
    }
    let mut unserved = LinExpr::default();
    for i in 0..a {
        let fixed = (UNSERVED_FACTOR * instance.orders[i].lateness_penalty) as f64;
        unserved.constant += fixed;
        unserved.terms.push((model.served(i), -fixed));
    }
    let mut overtime = LinExpr::default();
    for m in 0..m_count {
        for i in 0..a {
            overtime.terms.push((model.overtime(m, i), instance.technicians[m].overtime_penalty as f64));
        }
    }
    let mut transport = LinExpr::default();
    for m in 0..m_count {
        for i in 0..w {
            for j in 0..w {
                let cost = instance.travel[i][j] as f64 * FUEL_COST;
                if cost != 0.0 {
                    transport.terms.push((model.arc(m, i, j), cost));
                }
            }
        }
    }
    model.kpis = vec![
        Kpi { name: "order_lateness_penalty", weight: WEIGHT_ORDER_PENALTY, expr: lateness },
        Kpi { name: "unserved_order_penalty", weight: WEIGHT_ORDER_PENALTY, expr: unserved },
        Kpi { name: "technician_overtime_penalty", weight: WEIGHT_TECHNICIAN_PENALTY, expr: overtime },
        Kpi { name: "transport_cost", weight: WEIGHT_TRANSPORT_COST, expr: transport },
    ];

    tracing::debug!(
        variables = model.kinds.len(),
        constraints = model.constraints.len(),
        "model built"
    );
    model
}

/// Build the model for an extended instance with a frozen plan layered on
/// top: every frozen arc and start time becomes a hard equality.
pub fn build_with_commitments(instance: &Instance, frozen: &FrozenPlan) -> Model {
    let mut model = build(instance);
    for arc in &frozen.arcs {
        model.pin_arc(arc.technician, arc.from, arc.to);
    }
    for &(waypoint, time) in &frozen.starts {
        model.pin_start(waypoint, time);
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Order, Technician};

    fn tiny() -> Instance {
        Instance {
            technicians: vec![
                Technician { skills: vec![true, false], overtime_penalty: 5 },
                Technician { skills: vec![true, true], overtime_penalty: 10 },
            ],
            orders: vec![
                Order {
                    duration: 30,
                    earliest_start: 0,
                    latest_end: 100,
                    lateness_penalty: 50,
                    required_skills: vec![true, false],
                },
                Order {
                    duration: 20,
                    earliest_start: 10,
                    latest_end: 90,
                    lateness_penalty: 80,
                    required_skills: vec![false, true],
                },
            ],
            travel: vec![
                vec![0, 12, 7, 9],
                vec![12, 0, 4, 6],
                vec![7, 4, 0, 11],
                vec![9, 6, 11, 0],
            ],
            shift_length: 200,
            max_shift_length: 300,
            seed: 1,
        }
    }

    #[test]
    fn test_variable_layout() {
        let instance = tiny();
        let model = build(&instance);
        let (m, a, w) = (2, 2, 4);
        assert_eq!(model.kinds().len(), m * w * w + w + a + a + m * a);
        assert!(matches!(model.kinds()[model.arc(1, 3, 2).0], VarKind::Binary));
        assert!(matches!(
            model.kinds()[model.start(0).0],
            VarKind::Integer { min: 0, max: 300 }
        ));
    }

    #[test]
    fn test_self_loops_pinned_to_zero() {
        let instance = tiny();
        let model = build(&instance);
        let target = model.arc(0, 1, 1);
        let pinned = model.constraints.iter().any(|c| match c {
            Constraint::Linear(LinearConstraint { expr, cmp: Cmp::Eq, rhs }) => {
                *rhs == 0.0 && expr.terms == vec![(target, 1.0)]
            }
            _ => false,
        });
        assert!(pinned);
    }

    #[test]
    fn test_pins_append_equalities() {
        let instance = tiny();
        let mut model = build(&instance);
        let before = model.constraints.len();
        model.pin_arc(0, 2, 0);
        model.pin_start(0, 42);
        assert_eq!(model.constraints.len(), before + 2);
        match &model.constraints[before + 1] {
            Constraint::Linear(LinearConstraint { expr, cmp: Cmp::Eq, rhs }) => {
                assert_eq!(expr.terms, vec![(model.start(0), 1.0)]);
                assert_eq!(*rhs, 42.0);
            }
            other => panic!("expected start pin, got {other:?}"),
        }
    }

    #[test]
    fn test_objective_folds_kpi_weights() {
        let instance = tiny();
        let model = build(&instance);
        let objective = model.objective();
        // Unserved KPI contributes its fixed constants at weight 1000.
        let fixed: f64 = instance
            .orders
            .iter()
            .map(|o| (UNSERVED_FACTOR * o.lateness_penalty) as f64)
            .sum();
        assert_eq!(objective.constant, 1000.0 * fixed);
    }
}

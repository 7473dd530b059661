//! dispatch-planner core
//!
//! Multi-technician, skill-constrained, time-windowed dispatch planning:
//! MILP model construction, route extraction, and cutoff-based replanning.

pub mod instance;
pub mod generate;
pub mod model;
pub mod solve;
pub mod extract;
pub mod replan;
pub mod server;

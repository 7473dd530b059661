//! HTTP surface: a stateless `GET /solve` endpoint.
//!
//! Every request is a fresh planning cycle (generate → build → solve →
//! extract), optionally followed by a freeze/extend/re-solve pair in
//! replanning mode. Malformed input yields a plain-text 500, matching the
//! original service contract; an infeasible model is a normal response with
//! `solved: false`.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use warp::Filter;
use warp::Reply;
use warp::http::StatusCode;

use crate::extract::{self, ExtractionError, Routes};
use crate::generate::{self, GenerateConfig, GenerateError};
use crate::instance::{Instance, InstanceError, Order};
use crate::model;
use crate::replan;
use crate::solve::{Assignment, MilpSolver, SolveError, SolveStatus, SolverAdapter};

/// Default solver budget in seconds. Callers with their own deadline must
/// pass a `timeout` strictly below it.
const DEFAULT_BUDGET_SECS: u64 = 25;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing parameter '{0}'")]
    Missing(&'static str),
    #[error("invalid value for parameter '{0}'")]
    Invalid(&'static str),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("{0}")]
    Generate(#[from] GenerateError),
    #[error("{0}")]
    Instance(#[from] InstanceError),
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    #[error("solver backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Serialize)]
pub struct SolveResponse {
    pub solved: bool,
    pub inputs: Inputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
}

/// Echo of the generated instance, mirroring the original result payload.
#[derive(Debug, Serialize)]
pub struct Inputs {
    pub travel: Vec<Vec<i64>>,
    pub durations: Vec<i64>,
    pub earliest_start: Vec<i64>,
    pub latest_end: Vec<i64>,
    pub technician_skills: Vec<Vec<u8>>,
    pub order_skills: Vec<Vec<u8>>,
    pub order_penalties: Vec<i64>,
    pub technician_penalties: Vec<i64>,
    pub shift_length: i64,
    pub max_shift_length: i64,
    pub seed: u64,
}

#[derive(Debug, Serialize)]
pub struct Outputs {
    pub alle_auftraege_erledigt: bool,
    pub routes_per_technician: BTreeMap<String, Vec<usize>>,
    pub start_times: BTreeMap<String, i64>,
    pub unserved_orders: Vec<usize>,
    pub replanned: bool,
    pub status: &'static str,
    pub objective: f64,
    pub kpis: BTreeMap<String, f64>,
}

/// The `/solve` route, ready for `warp::serve`.
pub fn routes() -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone
{
    warp::path("solve")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and_then(handle_solve)
}

async fn handle_solve(
    params: HashMap<String, String>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let outcome = tokio::task::spawn_blocking(move || run_cycle(&params)).await;
    let reply = match outcome {
        Ok(Ok(body)) => warp::reply::json(&body).into_response(),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "planning cycle failed");
            warp::reply::with_status(err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
        Err(join) => {
            tracing::error!(error = %join, "solver task panicked");
            warp::reply::with_status(join.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    };
    Ok(reply)
}

/// One full planning cycle for a request, replanning included.
fn run_cycle(params: &HashMap<String, String>) -> Result<SolveResponse, CycleError> {
    let config = config_from(params)?;
    let seed = required::<u64>(params, "seed")?;
    let budget =
        Duration::from_secs(optional::<u64>(params, "timeout")?.unwrap_or(DEFAULT_BUDGET_SECS));

    let instance = generate::generate(&config, seed)?;
    let solver = MilpSolver;

    let model = model::build(&instance);
    let assignment = match solver.solve(&model, budget) {
        Ok(assignment) => assignment,
        Err(SolveError::Infeasible | SolveError::NoSolution) => {
            return Ok(unsolved(&instance));
        }
        Err(SolveError::Backend(message)) => return Err(CycleError::Backend(message)),
    };
    let routes = extract::extract(&instance, &assignment)?;

    let Some(cutoff) = optional::<i64>(params, "replan_cutoff")? else {
        return Ok(respond(&instance, &assignment, &routes, false));
    };

    let new_order = Order {
        duration: required(params, "new_duration")?,
        earliest_start: required(params, "new_earliest")?,
        latest_end: required(params, "new_deadline")?,
        lateness_penalty: required(params, "new_penalty")?,
        required_skills: skill_vector(params, instance.skill_count())?,
    };
    let frozen = replan::freeze(&instance, &routes, &assignment, cutoff);
    let distances = generate::extension_distances(&instance, &config);
    let (extended, commitments) = replan::apply(&instance, &frozen, new_order, &distances)?;

    let model = model::build_with_commitments(&extended, &commitments);
    let assignment = match solver.solve(&model, budget) {
        Ok(assignment) => assignment,
        Err(SolveError::Infeasible | SolveError::NoSolution) => {
            return Ok(unsolved(&extended));
        }
        Err(SolveError::Backend(message)) => return Err(CycleError::Backend(message)),
    };
    let routes = extract::extract(&extended, &assignment)?;
    Ok(respond(&extended, &assignment, &routes, true))
}

fn config_from(params: &HashMap<String, String>) -> Result<GenerateConfig, CycleError> {
    let mut config = GenerateConfig {
        technicians: required(params, "technicians")?,
        orders: required(params, "orders")?,
        skills: required(params, "skills")?,
        shift_length: required(params, "shift_length")?,
        max_shift_length: required(params, "max_shift_length")?,
        ..GenerateConfig::default()
    };

    if optional::<bool>(params, "advanced")?.unwrap_or(false) {
        macro_rules! override_field {
            ($($name:ident),*) => {
                $(if let Some(value) = optional(params, stringify!($name))? {
                    config.$name = value;
                })*
            };
        }
        override_field!(
            distance_max,
            duration_min,
            duration_max,
            earliest_max,
            slack_min,
            slack_max,
            order_penalty_min,
            order_penalty_max,
            tech_penalty_min,
            tech_penalty_max
        );
    }
    Ok(config)
}

fn required<T: FromStr>(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<T, RequestError> {
    optional(params, name)?.ok_or(RequestError::Missing(name))
}

fn optional<T: FromStr>(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<T>, RequestError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| RequestError::Invalid(name)),
    }
}

/// Parse the `new_skills` comma-separated 0/1 vector.
fn skill_vector(
    params: &HashMap<String, String>,
    expected: usize,
) -> Result<Vec<bool>, RequestError> {
    let raw = params.get("new_skills").ok_or(RequestError::Missing("new_skills"))?;
    let skills: Vec<bool> = raw
        .split(',')
        .map(|entry| match entry.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(RequestError::Invalid("new_skills")),
        })
        .collect::<Result<_, _>>()?;
    if skills.len() != expected {
        return Err(RequestError::Invalid("new_skills"));
    }
    Ok(skills)
}

fn unsolved(instance: &Instance) -> SolveResponse {
    SolveResponse { solved: false, inputs: inputs_of(instance), outputs: None }
}

fn respond(
    instance: &Instance,
    assignment: &Assignment,
    routes: &Routes,
    replanned: bool,
) -> SolveResponse {
    let routes_per_technician = routes
        .tours
        .iter()
        .enumerate()
        .map(|(m, tour)| (m.to_string(), tour.clone()))
        .collect();
    let start_times = routes
        .served
        .iter()
        .map(|&i| (i.to_string(), assignment.starts[i]))
        .collect();
    let kpis = assignment.kpis.iter().map(|&(name, value)| (name.to_string(), value)).collect();

    SolveResponse {
        solved: true,
        inputs: inputs_of(instance),
        outputs: Some(Outputs {
            alle_auftraege_erledigt: routes.unserved.is_empty(),
            routes_per_technician,
            start_times,
            unserved_orders: routes.unserved.clone(),
            replanned,
            status: match assignment.status {
                SolveStatus::Optimal => "optimal",
                SolveStatus::Feasible => "feasible",
            },
            objective: assignment.objective,
            kpis,
        }),
    }
}

fn inputs_of(instance: &Instance) -> Inputs {
    let bits = |skills: &[bool]| skills.iter().map(|&s| s as u8).collect();
    Inputs {
        travel: instance.travel.clone(),
        durations: instance.orders.iter().map(|o| o.duration).collect(),
        earliest_start: instance.orders.iter().map(|o| o.earliest_start).collect(),
        latest_end: instance.orders.iter().map(|o| o.latest_end).collect(),
        technician_skills: instance.technicians.iter().map(|t| bits(&t.skills)).collect(),
        order_skills: instance.orders.iter().map(|o| bits(&o.required_skills)).collect(),
        order_penalties: instance.orders.iter().map(|o| o.lateness_penalty).collect(),
        technician_penalties: instance.technicians.iter().map(|t| t.overtime_penalty).collect(),
        shift_length: instance.shift_length,
        max_shift_length: instance.max_shift_length,
        seed: instance.seed,
    }
}

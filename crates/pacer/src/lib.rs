//! Race-time forecasting for cyclists.
//!
//! Given a georeferenced course, a rider's physiological profile and
//! optional weather, the kernel predicts the fastest feasible finish time
//! and the per-segment power/speed trajectory: the course is cleaned and
//! cut into atomic segments, a grade-aware pacing policy proposes target
//! powers, a per-segment physics advancer integrates speed and time, and
//! a binary search finds the highest base power the rider can sustain
//! without depleting W'.
//!
//! The kernel is pure and deterministic: no I/O, no clocks, no global
//! state. Collaborators inject `Course`, `RiderProfile` and `Environment`
//! at call time and receive samples plus aggregates back.

pub mod aggregate;
pub mod errors;
pub mod gpx_import;
pub mod loader;
pub mod models;
pub mod pacing;
pub mod physics;
pub mod rider;
pub mod segmenter;
pub mod simulation;
pub mod solver;
pub mod types;

use std::time::Duration;

use tracing::info;

use crate::errors::Result;
use crate::models::{Course, Environment, UserSegment};
use crate::rider::RiderProfile;
use crate::simulation::Simulator;
use crate::solver::PacingSolution;
use crate::types::requests::SimulationRequest;
use crate::types::responses::SimulationResponse;

/// Solves the pacing problem for already-normalized kernel inputs.
pub fn simulate_course(
    course: &Course,
    rider: &RiderProfile,
    env: Environment,
    user_segments: Vec<UserSegment>,
    deadline: Option<Duration>,
) -> Result<PacingSolution> {
    info!(
        points = course.points.len(),
        atomic_segments = course.segments.len(),
        distance_km = format!("{:.1}", course.total_distance_m / 1000.0),
        ascent_m = format!("{:.0}", course.ascent_m),
        "course ready"
    );
    let sim = Simulator::new(course, rider, env).with_user_segments(user_segments);
    solver::solve(&sim, deadline)
}

/// Runs one marshalled request end to end.
pub fn run_request(
    request: SimulationRequest,
    deadline: Option<Duration>,
) -> Result<SimulationResponse> {
    let course = request.course.into_course()?;
    let rider = request.rider.into_profile()?;
    let env = request.environment.into_environment()?;
    let segments = request
        .segments
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.into_segment(i))
        .collect::<Result<Vec<_>>>()?;

    let solution = simulate_course(&course, &rider, env, segments, deadline)?;
    Ok(SimulationResponse::from_solution(&course, &solution))
}

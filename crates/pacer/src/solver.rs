//! Pacing optimizer: finds the highest base power the rider can carry
//! over the course without depleting W' and without the trajectory's
//! normalized power exceeding the PDC limit for the resulting duration.
//!
//! Binary search over base power; every candidate replays a full forward
//! integration. Trials share nothing, so the search is deterministic.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::errors::{Result, SimulationError};
use crate::simulation::{PacingMode, Simulator, Trajectory};

/// Search bracket for base power, W.
const POWER_FLOOR_W: f64 = 10.0;
const POWER_CEILING_W: f64 = 1500.0;

/// Iteration budget and bracket width at which the search stops.
const MAX_ITERATIONS: u32 = 30;
const CONVERGENCE_W: f64 = 0.1;

/// A trial is NP-feasible while its normalized power stays within this
/// of the PDC limit for its duration.
const NP_TOLERANCE_W: f64 = 0.5;

/// Finish-time seed before the first feasible trial: 25 km/h over the
/// course distance.
const INITIAL_SPEED_ESTIMATE_MPS: f64 = 25.0 / 3.6;

/// Summary of one solver trial, kept for diagnostics and the
/// infeasible-course error payload.
#[derive(Debug, Clone)]
pub struct Trial {
    pub base_power_w: f64,
    pub finish_time_s: f64,
    pub normalized_power_w: f64,
    pub np_limit_w: f64,
    pub bonked: bool,
}

/// Solver bookkeeping surfaced alongside the result.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    pub iterations: u32,
    pub converged: bool,
    pub feasible: bool,
    /// The deadline elapsed and the best trial found so far was returned.
    pub preliminary: bool,
}

/// The accepted pacing: highest feasible base power and its trajectory.
#[derive(Debug, Clone)]
pub struct PacingSolution {
    pub base_power_w: f64,
    pub trajectory: Trajectory,
    pub diagnostics: Diagnostics,
}

/// Runs the binary search. `deadline` bounds wall-clock time; it is
/// checked cooperatively at iteration boundaries.
pub fn solve(sim: &Simulator, deadline: Option<Duration>) -> Result<PacingSolution> {
    let started = Instant::now();
    let rider = sim.rider();

    let mut lo = POWER_FLOOR_W;
    let mut hi = POWER_CEILING_W;
    let mut best: Option<(f64, Trajectory)> = None;
    let mut closest_infeasible: Option<Trial> = None;
    let mut finish_estimate_s = sim.course().total_distance_m / INITIAL_SPEED_ESTIMATE_MPS;

    let mut iterations = 0u32;
    let mut converged = false;
    let mut preliminary = false;

    while iterations < MAX_ITERATIONS {
        if hi - lo <= CONVERGENCE_W {
            converged = true;
            break;
        }
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                preliminary = true;
                break;
            }
        }
        iterations += 1;

        let candidate = 0.5 * (lo + hi);
        let cap_w = rider.capped_power(finish_estimate_s / 3600.0);

        match sim.run(candidate, PacingMode::Adaptive { cap_w }) {
            Ok(trajectory) => {
                let finish_s = trajectory.finish_time_s();
                let np = trajectory.summary.normalized_power_w;
                let np_limit = rider.pdc.limit_power(finish_s);
                let feasible = !trajectory.bonked && np <= np_limit + NP_TOLERANCE_W;

                debug!(
                    iteration = iterations,
                    candidate_w = format!("{candidate:.1}"),
                    finish_s = format!("{finish_s:.0}"),
                    np_w = format!("{np:.1}"),
                    np_limit_w = format!("{np_limit:.1}"),
                    bonked = trajectory.bonked,
                    feasible,
                    "solver trial"
                );

                if feasible {
                    finish_estimate_s = finish_s;
                    lo = candidate;
                    best = Some((candidate, trajectory));
                } else {
                    closest_infeasible = Some(Trial {
                        base_power_w: candidate,
                        finish_time_s: finish_s,
                        normalized_power_w: np,
                        np_limit_w: np_limit,
                        bonked: trajectory.bonked,
                    });
                    hi = candidate;
                }
            }
            // A numerically unstable trial is rejected like an infeasible
            // one; anything else is a real failure.
            Err(SimulationError::NumericalInstability { segment, quantity }) => {
                debug!(candidate_w = format!("{candidate:.1}"), segment, quantity, "unstable trial rejected");
                hi = candidate;
            }
            Err(other) => return Err(other),
        }
    }

    match best {
        Some((base_power_w, trajectory)) => {
            info!(
                base_power_w = format!("{base_power_w:.1}"),
                finish_s = format!("{:.0}", trajectory.finish_time_s()),
                iterations,
                converged,
                "pacing solved"
            );
            Ok(PacingSolution {
                base_power_w,
                trajectory,
                diagnostics: Diagnostics {
                    iterations,
                    converged,
                    feasible: true,
                    preliminary,
                },
            })
        }
        None if preliminary => Err(SimulationError::DeadlineExceeded),
        None => {
            let closest = closest_infeasible.unwrap_or(Trial {
                base_power_w: POWER_FLOOR_W,
                finish_time_s: 0.0,
                normalized_power_w: 0.0,
                np_limit_w: 0.0,
                bonked: true,
            });
            Err(SimulationError::InfeasibleCourse {
                closest: Box::new(closest),
            })
        }
    }
}

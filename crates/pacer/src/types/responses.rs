//! Simulation result payloads.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Course, SegmentKind, TrackSample};
use crate::solver::PacingSolution;

const MPS_TO_KMH: f64 = 3.6;

/// One trackpoint of the predicted trajectory, at an atomic-segment
/// boundary.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSampleResponse {
    pub dist_km: f64,
    pub ele_m: f64,
    pub speed_kmh: f64,
    pub power_w: f64,
    pub time_sec: f64,
    pub w_prime_j: f64,
    pub walking: bool,
}

impl TrackSampleResponse {
    fn from_sample(sample: &TrackSample) -> Self {
        Self {
            dist_km: sample.dist_m / 1000.0,
            ele_m: sample.ele_m,
            speed_kmh: sample.speed_mps * MPS_TO_KMH,
            power_w: sample.power_w,
            time_sec: sample.time_s,
            w_prime_j: sample.w_prime_j,
            walking: sample.is_walking(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSegmentResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub distance_m: f64,
    pub avg_grade: f64,
    pub duration_s: f64,
    pub avg_power_w: f64,
    pub avg_speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub solver_iterations: u32,
    pub converged: bool,
    pub feasible: bool,
    pub preliminary: bool,
    pub walking_distance_m: f64,
    pub braking_distance_m: f64,
}

/// The full response: aggregates, diagnostics and the per-boundary track.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResponse {
    pub base_power_w: f64,
    pub total_time_sec: f64,
    pub avg_speed_kmh: f64,
    pub avg_power_w: f64,
    pub normalized_power_w: f64,
    pub work_kj: f64,
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub per_user_segment: Vec<UserSegmentResponse>,
    pub diagnostics: DiagnosticsResponse,
    pub track: Vec<TrackSampleResponse>,
}

impl SimulationResponse {
    pub fn from_solution(course: &Course, solution: &PacingSolution) -> Self {
        let summary = &solution.trajectory.summary;
        Self {
            base_power_w: solution.base_power_w,
            total_time_sec: summary.total_time_s,
            avg_speed_kmh: summary.avg_speed_mps * MPS_TO_KMH,
            avg_power_w: summary.avg_power_w,
            normalized_power_w: summary.normalized_power_w,
            work_kj: summary.work_kj,
            distance_km: summary.distance_m / 1000.0,
            elevation_gain_m: course.ascent_m,
            elevation_loss_m: course.descent_m,
            per_user_segment: summary
                .per_user_segment
                .iter()
                .map(|s| UserSegmentResponse {
                    id: s.id,
                    kind: s.kind,
                    distance_m: s.distance_m,
                    avg_grade: s.avg_grade,
                    duration_s: s.duration_s,
                    avg_power_w: s.avg_power_w,
                    avg_speed_kmh: s.avg_speed_mps * MPS_TO_KMH,
                })
                .collect(),
            diagnostics: DiagnosticsResponse {
                solver_iterations: solution.diagnostics.iterations,
                converged: solution.diagnostics.converged,
                feasible: solution.diagnostics.feasible,
                preliminary: solution.diagnostics.preliminary,
                walking_distance_m: summary.walking_distance_m,
                braking_distance_m: summary.braking_distance_m,
            },
            track: solution
                .trajectory
                .samples
                .iter()
                .map(TrackSampleResponse::from_sample)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumflags2::BitFlags;

    #[test]
    fn test_sample_unit_conversions() {
        let sample = TrackSample {
            dist_m: 1500.0,
            ele_m: 120.0,
            speed_mps: 10.0,
            power_w: 250.0,
            time_s: 180.0,
            w_prime_j: 15_000.0,
            flags: BitFlags::empty(),
        };
        let response = TrackSampleResponse::from_sample(&sample);
        assert!((response.dist_km - 1.5).abs() < 1e-9);
        assert!((response.speed_kmh - 36.0).abs() < 1e-9);
        assert!(!response.walking);
    }
}

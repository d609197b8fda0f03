//! Simulation request payloads and their normalization into kernel inputs.

use std::collections::BTreeMap;

use geo::{Bearing, Haversine, Point};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{Result, SimulationError};
use crate::loader::{self, RawTrackPoint};
use crate::models::{AtomicSegment, Course, Environment, Surface, TrackPoint, UserSegment};
use crate::rider::{Drivetrain, PowerDurationCurve, RiderProfile};

/// One simulation request: course, rider, optional conditions and
/// optional user segments.
#[derive(Debug, Deserialize)]
pub struct SimulationRequest {
    pub course: CourseInput,
    pub rider: RiderSpec,
    #[serde(default)]
    pub environment: EnvironmentSpec,
    #[serde(default)]
    pub segments: Vec<UserSegmentSpec>,
}

/// Courses arrive either as raw GPS tuples or as the columnar payload a
/// map-matching collaborator produces.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CourseInput {
    Raw(Vec<RawPointSpec>),
    Refined(RefinedCourseSpec),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawPointSpec {
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
}

/// Pre-refined columnar course. Distances in meters, grades as ratios,
/// headings in degrees from north.
#[derive(Debug, Deserialize)]
pub struct RefinedCourseSpec {
    pub points: RefinedPointsSpec,
    pub segments: RefinedSegmentsSpec,
}

#[derive(Debug, Deserialize)]
pub struct RefinedPointsSpec {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub ele: Vec<f64>,
    pub dist: Vec<f64>,
    pub grade: Vec<f64>,
    pub surf: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct RefinedSegmentsSpec {
    pub p_start: Vec<usize>,
    pub p_end: Vec<usize>,
    pub length: Vec<f64>,
    pub avg_grade: Vec<f64>,
    pub surf_id: Vec<u8>,
    pub avg_head: Vec<f64>,
}

impl CourseInput {
    /// Normalizes either input shape into the kernel's columnar course.
    pub fn into_course(self) -> Result<Course> {
        match self {
            CourseInput::Raw(points) => {
                let raw: Vec<RawTrackPoint> = points
                    .iter()
                    .map(|p| RawTrackPoint::new(p.lat, p.lon, p.ele))
                    .collect();
                loader::build_course(&raw)
            }
            CourseInput::Refined(spec) => spec.into_course(),
        }
    }
}

impl RefinedCourseSpec {
    fn into_course(self) -> Result<Course> {
        let p = &self.points;
        let n = p.lat.len();
        if n < 2 {
            return Err(SimulationError::EmptyCourse(n));
        }
        for (name, len) in [
            ("lon", p.lon.len()),
            ("ele", p.ele.len()),
            ("dist", p.dist.len()),
            ("grade", p.grade.len()),
            ("surf", p.surf.len()),
        ] {
            if len != n {
                return Err(SimulationError::malformed(
                    format!("course.points.{name}"),
                    format!("expected {n} entries, got {len}"),
                ));
            }
        }

        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            if !(p.lat[i].is_finite() && p.lon[i].is_finite() && p.ele[i].is_finite()) {
                return Err(SimulationError::malformed(
                    format!("course.points[{i}]"),
                    "non-finite coordinate",
                ));
            }
            if i > 0 && p.dist[i] < p.dist[i - 1] {
                return Err(SimulationError::malformed(
                    format!("course.points.dist[{i}]"),
                    "cumulative distance decreases",
                ));
            }
            points.push(TrackPoint {
                lat: p.lat[i],
                lon: p.lon[i],
                ele_m: p.ele[i],
                dist_m: p.dist[i],
                grade: p.grade[i].clamp(-0.25, 0.25),
                heading_rad: 0.0,
                surface: Surface::from_id(p.surf[i]),
            });
        }
        for i in 0..n - 1 {
            points[i].heading_rad = Haversine
                .bearing(
                    Point::new(points[i].lon, points[i].lat),
                    Point::new(points[i + 1].lon, points[i + 1].lat),
                )
                .to_radians();
        }
        points[n - 1].heading_rad = points[n - 2].heading_rad;

        let s = &self.segments;
        let count = s.p_start.len();
        for (name, len) in [
            ("p_end", s.p_end.len()),
            ("length", s.length.len()),
            ("avg_grade", s.avg_grade.len()),
            ("surf_id", s.surf_id.len()),
            ("avg_head", s.avg_head.len()),
        ] {
            if len != count {
                return Err(SimulationError::malformed(
                    format!("course.segments.{name}"),
                    format!("expected {count} entries, got {len}"),
                ));
            }
        }

        let mut segments = Vec::with_capacity(count);
        for i in 0..count {
            if s.p_end[i] >= n || s.p_start[i] >= s.p_end[i] {
                return Err(SimulationError::malformed(
                    format!("course.segments[{i}]"),
                    "point indices out of order",
                ));
            }
            if s.length[i] <= 0.0 {
                return Err(SimulationError::malformed(
                    format!("course.segments.length[{i}]"),
                    "must be positive",
                ));
            }
            segments.push(AtomicSegment {
                start_idx: s.p_start[i],
                end_idx: s.p_end[i],
                length_m: s.length[i],
                avg_grade: s.avg_grade[i],
                avg_heading_rad: s.avg_head[i].to_radians(),
                surface: Surface::from_id(s.surf_id[i]),
            });
        }

        Ok(loader::assemble(points, segments))
    }
}

/// Rider payload; see the documented request surface for field meanings.
#[derive(Debug, Deserialize)]
pub struct RiderSpec {
    pub mass_kg: f64,
    pub cp_w: f64,
    pub w_prime_j: f64,
    /// `{"<seconds>": watts}`.
    pub pdc: BTreeMap<String, f64>,
    pub cda_m2: f64,
    pub crr: f64,
    pub bike_mass_kg: f64,
    #[serde(default)]
    pub drivetrain_key: Drivetrain,
}

impl RiderSpec {
    pub fn into_profile(self) -> Result<RiderProfile> {
        for (path, value) in [
            ("rider.mass_kg", self.mass_kg),
            ("rider.cp_w", self.cp_w),
            ("rider.cda_m2", self.cda_m2),
            ("rider.crr", self.crr),
            ("rider.bike_mass_kg", self.bike_mass_kg),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimulationError::malformed(path, "must be a positive number"));
            }
        }
        if !self.w_prime_j.is_finite() || self.w_prime_j < 0.0 {
            return Err(SimulationError::malformed("rider.w_prime_j", "must be >= 0"));
        }

        let mut pairs = Vec::with_capacity(self.pdc.len());
        for (key, watts) in &self.pdc {
            let duration: f64 = key.parse().map_err(|_| {
                SimulationError::malformed(
                    format!("rider.pdc.{key}"),
                    "key must be a duration in seconds",
                )
            })?;
            pairs.push((duration, *watts));
        }

        Ok(RiderProfile {
            mass_kg: self.mass_kg,
            cp_w: self.cp_w,
            w_prime_j: self.w_prime_j,
            pdc: PowerDurationCurve::new(pairs)?,
            cda_m2: self.cda_m2,
            crr: self.crr,
            bike_mass_kg: self.bike_mass_kg,
            drivetrain: self.drivetrain_key,
        })
    }
}

/// Ambient conditions; every field has the documented default.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EnvironmentSpec {
    pub temp_c: f64,
    pub altitude_m: f64,
    pub wind_speed_mps: f64,
    pub wind_bearing_deg: f64,
}

impl Default for EnvironmentSpec {
    fn default() -> Self {
        Self {
            temp_c: 20.0,
            altitude_m: 0.0,
            wind_speed_mps: 0.0,
            wind_bearing_deg: 0.0,
        }
    }
}

impl EnvironmentSpec {
    pub fn into_environment(self) -> Result<Environment> {
        if !(-40.0..=60.0).contains(&self.temp_c) {
            return Err(SimulationError::malformed(
                "environment.temp_c",
                "must be within [-40, 60]",
            ));
        }
        if !self.wind_speed_mps.is_finite() || self.wind_speed_mps < 0.0 {
            return Err(SimulationError::malformed(
                "environment.wind_speed_mps",
                "must be >= 0",
            ));
        }
        Ok(Environment {
            temp_c: self.temp_c,
            altitude_m: self.altitude_m,
            wind_speed_mps: self.wind_speed_mps,
            wind_bearing_rad: self.wind_bearing_deg.to_radians(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSegmentSpec {
    pub id: Uuid,
    pub start_dist_m: f64,
    pub end_dist_m: f64,
    #[serde(default)]
    pub target_power_w: Option<f64>,
}

impl UserSegmentSpec {
    pub fn into_segment(self, index: usize) -> Result<UserSegment> {
        if self.end_dist_m <= self.start_dist_m {
            return Err(SimulationError::malformed(
                format!("segments[{index}]"),
                "end_dist_m must exceed start_dist_m",
            ));
        }
        if let Some(power) = self.target_power_w {
            if !power.is_finite() || power < 0.0 {
                return Err(SimulationError::malformed(
                    format!("segments[{index}].target_power_w"),
                    "must be >= 0",
                ));
            }
        }
        Ok(UserSegment {
            id: self.id,
            start_dist_m: self.start_dist_m,
            end_dist_m: self.end_dist_m,
            target_power_w: self.target_power_w,
        })
    }
}

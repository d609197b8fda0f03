//! Course loading and cleaning.
//!
//! Turns raw GPS tuples into uniformly spaced, physics-ready trackpoints:
//! minimum-distance pruning, elevation smoothing, cumulative distance,
//! clamped grades and forward-difference headings.

use geo::{Bearing, Distance, Haversine, Point};
use time::OffsetDateTime;
use tracing::debug;

use crate::errors::{Result, SimulationError};
use crate::models::{Course, PointColumns, Surface, TrackPoint};
use crate::segmenter;

/// Points closer than this to the previous retained point are GPS jitter.
const MIN_POINT_SPACING_M: f64 = 5.0;

/// Half-width of the centered elevation moving average.
const SMOOTHING_HALF_WIDTH: usize = 5;

/// Grades steeper than this are treated as elevation-noise singularities.
const GRADE_LIMIT: f64 = 0.25;

/// A raw GPS fix as supplied by the caller or read from a GPX file.
/// The timestamp, when present, is carried but not used by the cleaner.
#[derive(Debug, Clone, Copy)]
pub struct RawTrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele_m: f64,
    pub time: Option<OffsetDateTime>,
}

impl RawTrackPoint {
    pub fn new(lat: f64, lon: f64, ele_m: f64) -> Self {
        Self {
            lat,
            lon,
            ele_m,
            time: None,
        }
    }
}

/// Cleans a raw point sequence into trackpoints ready for segmentation.
pub fn clean(raw: &[RawTrackPoint]) -> Result<Vec<TrackPoint>> {
    for (i, p) in raw.iter().enumerate() {
        if !(p.lat.is_finite() && p.lon.is_finite() && p.ele_m.is_finite()) {
            return Err(SimulationError::malformed(
                format!("course.points[{i}]"),
                "non-finite coordinate",
            ));
        }
    }

    let pruned = prune(raw);
    if pruned.len() < 2 {
        return Err(SimulationError::EmptyCourse(pruned.len()));
    }

    let elevations = smooth_elevation(&pruned);

    let mut points = Vec::with_capacity(pruned.len());
    let mut dist_m = 0.0;
    for (i, p) in pruned.iter().enumerate() {
        let mut grade = 0.0;
        if i > 0 {
            let prev = &pruned[i - 1];
            let step = Haversine.distance(
                Point::new(prev.lon, prev.lat),
                Point::new(p.lon, p.lat),
            );
            dist_m += step;
            grade = ((elevations[i] - elevations[i - 1]) / step).clamp(-GRADE_LIMIT, GRADE_LIMIT);
        }
        points.push(TrackPoint {
            lat: p.lat,
            lon: p.lon,
            ele_m: elevations[i],
            dist_m,
            grade,
            heading_rad: 0.0,
            surface: Surface::Paved,
        });
    }

    // Forward-difference heading; the last point repeats the previous one.
    for i in 0..points.len() - 1 {
        let bearing_deg = Haversine.bearing(
            Point::new(points[i].lon, points[i].lat),
            Point::new(points[i + 1].lon, points[i + 1].lat),
        );
        points[i].heading_rad = bearing_deg.to_radians();
    }
    let n = points.len();
    points[n - 1].heading_rad = points[n - 2].heading_rad;

    debug!(
        raw = raw.len(),
        cleaned = points.len(),
        distance_m = format!("{dist_m:.0}"),
        "course cleaned"
    );

    Ok(points)
}

/// Cleans, segments and summarizes a raw course in one pass.
pub fn build_course(raw: &[RawTrackPoint]) -> Result<Course> {
    let points = clean(raw)?;
    let segments = segmenter::segment(&points);
    Ok(assemble(points, segments))
}

/// Packs cleaned points and their atomic segments into a `Course`.
pub fn assemble(points: Vec<TrackPoint>, segments: Vec<crate::models::AtomicSegment>) -> Course {
    let total_distance_m = points.last().map_or(0.0, |p| p.dist_m);
    let (mut ascent_m, mut descent_m) = (0.0, 0.0);
    for pair in points.windows(2) {
        let delta = pair[1].ele_m - pair[0].ele_m;
        if delta > 0.0 {
            ascent_m += delta;
        } else {
            descent_m -= delta;
        }
    }
    Course {
        points: PointColumns::from_points(&points),
        segments,
        total_distance_m,
        ascent_m,
        descent_m,
    }
}

fn prune(raw: &[RawTrackPoint]) -> Vec<RawTrackPoint> {
    let mut retained: Vec<RawTrackPoint> = Vec::with_capacity(raw.len());
    for p in raw {
        match retained.last() {
            None => retained.push(*p),
            Some(prev) => {
                let step = Haversine.distance(
                    Point::new(prev.lon, prev.lat),
                    Point::new(p.lon, p.lat),
                );
                if step >= MIN_POINT_SPACING_M {
                    retained.push(*p);
                }
            }
        }
    }
    retained
}

/// Centered moving average over elevation.
///
/// The window shrinks symmetrically near the ends so that locally linear
/// profiles pass through unchanged everywhere, including the boundaries.
fn smooth_elevation(points: &[RawTrackPoint]) -> Vec<f64> {
    let n = points.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let half = SMOOTHING_HALF_WIDTH.min(i).min(n - 1 - i);
        let window = &points[i - half..=i + half];
        let sum: f64 = window.iter().map(|p| p.ele_m).sum();
        out.push(sum / window.len() as f64);
    }
    out
}

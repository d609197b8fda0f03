//! GPX course import.
//!
//! Flattens all tracks and segments of a GPX document, in order, into the
//! raw point sequence the course loader cleans. Only geometry and
//! timestamps are read; sensor extensions are ignored.

use std::io::Read;

use gpx::read;
use time::OffsetDateTime;

use crate::errors::{Result, SimulationError};
use crate::loader::RawTrackPoint;

/// Reads a GPX document into raw trackpoints.
///
/// Points without elevation carry the previous point's elevation forward;
/// a leading run without elevation reads as 0 m.
pub fn read_course(reader: impl Read) -> Result<Vec<RawTrackPoint>> {
    let gpx = read(reader).map_err(|e| SimulationError::GpxParsing(e.to_string()))?;

    let mut points = Vec::new();
    let mut last_ele = 0.0;
    for track in &gpx.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let ele = waypoint.elevation.unwrap_or(last_ele);
                last_ele = ele;
                points.push(RawTrackPoint {
                    lat: waypoint.point().y(),
                    lon: waypoint.point().x(),
                    ele_m: ele,
                    time: waypoint.time.map(OffsetDateTime::from),
                });
            }
        }
    }

    if points.is_empty() {
        return Err(SimulationError::EmptyCourse(0));
    }
    Ok(points)
}

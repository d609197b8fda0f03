//! Adaptive segmentation of the cleaned track into atomic segments.
//!
//! Atomic segments are the physics unit: short stretches (nominally 20 m)
//! over which grade and heading are treated as uniform. Boundaries fall
//! where the accumulated length reaches the chunk size or where grade or
//! heading shifts enough to matter.

use crate::models::{AtomicSegment, TrackPoint};

/// Nominal atomic segment length, meters.
const CHUNK_LENGTH_M: f64 = 20.0;

/// Close the running segment when the step grade departs from the
/// segment average by more than this ratio (0.5 %).
const GRADE_TRIGGER: f64 = 0.005;

/// Close the running segment on heading changes beyond this, radians (15 deg).
const HEADING_TRIGGER_RAD: f64 = 15.0 * std::f64::consts::PI / 180.0;

/// Tail fragments shorter than this merge into the previous segment.
const MIN_TAIL_M: f64 = 5.0;

/// Partitions cleaned trackpoints into contiguous atomic segments.
///
/// The union of the returned segments covers the course exactly:
/// each segment's end index is the next segment's start index.
pub fn segment(points: &[TrackPoint]) -> Vec<AtomicSegment> {
    if points.len() < 2 {
        return Vec::new();
    }

    let mut segments = Vec::with_capacity(points.len() / 2);
    let mut start = 0usize;
    let mut i = 1usize;

    while i < points.len() {
        // A grade or heading shift at point i means the step into i does
        // not belong to the running segment: close at i-1 instead, so the
        // shift never blends into the closed segment's averages.
        if i > start + 1 && (grade_shifted(points, start, i) || heading_shifted(points, start, i))
        {
            segments.push(close_segment(points, start, i - 1));
            start = i - 1;
            continue;
        }

        let length = points[i].dist_m - points[start].dist_m;
        if i == points.len() - 1 || length >= CHUNK_LENGTH_M {
            segments.push(close_segment(points, start, i));
            start = i;
        }
        i += 1;
    }

    merge_short_tail(points, &mut segments);
    segments
}

/// Step grade at `i` vs the average grade of the running segment.
fn grade_shifted(points: &[TrackPoint], start: usize, i: usize) -> bool {
    let length = points[i].dist_m - points[start].dist_m;
    if length <= 0.0 {
        return false;
    }
    let running = (points[i].ele_m - points[start].ele_m) / length;
    (points[i].grade - running).abs() > GRADE_TRIGGER
}

fn heading_shifted(points: &[TrackPoint], start: usize, i: usize) -> bool {
    angular_difference(points[i].heading_rad, points[start].heading_rad).abs()
        > HEADING_TRIGGER_RAD
}

fn close_segment(points: &[TrackPoint], start: usize, end: usize) -> AtomicSegment {
    let length_m = points[end].dist_m - points[start].dist_m;
    let avg_grade = (points[end].ele_m - points[start].ele_m) / length_m;
    AtomicSegment {
        start_idx: start,
        end_idx: end,
        length_m,
        avg_grade,
        avg_heading_rad: circular_mean(&points[start..end]),
        surface: points[start].surface,
    }
}

/// Folds a final fragment under 5 m into the previous segment.
fn merge_short_tail(points: &[TrackPoint], segments: &mut Vec<AtomicSegment>) {
    if segments.len() < 2 {
        return;
    }
    let last = segments[segments.len() - 1];
    if last.length_m >= MIN_TAIL_M {
        return;
    }
    segments.pop();
    let prev = segments.pop().expect("checked len >= 2");
    segments.push(close_segment(points, prev.start_idx, last.end_idx));
}

/// Circular mean of point headings, radians.
fn circular_mean(points: &[TrackPoint]) -> f64 {
    let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
    for p in points {
        sin_sum += p.heading_rad.sin();
        cos_sum += p.heading_rad.cos();
    }
    sin_sum.atan2(cos_sum)
}

/// Signed smallest difference between two angles, radians in (-pi, pi].
fn angular_difference(a: f64, b: f64) -> f64 {
    let mut d = a - b;
    while d > std::f64::consts::PI {
        d -= 2.0 * std::f64::consts::PI;
    }
    while d <= -std::f64::consts::PI {
        d += 2.0 * std::f64::consts::PI;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Surface;

    fn point(dist_m: f64, ele_m: f64, heading_rad: f64, grade: f64) -> TrackPoint {
        TrackPoint {
            lat: 0.0,
            lon: 0.0,
            ele_m,
            dist_m,
            grade,
            heading_rad,
            surface: Surface::Paved,
        }
    }

    fn uniform_track(n: usize, spacing_m: f64, grade: f64) -> Vec<TrackPoint> {
        (0..n)
            .map(|i| {
                let d = i as f64 * spacing_m;
                point(d, d * grade, 0.0, grade)
            })
            .collect()
    }

    #[test]
    fn test_segments_cover_course_exactly() {
        let points = uniform_track(101, 10.0, 0.03);
        let segments = segment(&points);
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start_idx, 0);
        assert_eq!(segments.last().unwrap().end_idx, 100);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_idx, pair[1].start_idx);
        }
        let total: f64 = segments.iter().map(|s| s.length_m).sum();
        assert!((total - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_chunk_length_close() {
        let points = uniform_track(101, 10.0, 0.0);
        let segments = segment(&points);
        // 10 m spacing closes at 20 m accumulated: two points per segment
        for s in &segments {
            assert!((s.length_m - 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_grade_change_creates_boundary() {
        // 100 m flat then 100 m at 6%
        let mut points = Vec::new();
        for i in 0..=10 {
            points.push(point(i as f64 * 10.0, 0.0, 0.0, 0.0));
        }
        for i in 1..=10 {
            let d = 100.0 + i as f64 * 10.0;
            points.push(point(d, (d - 100.0) * 0.06, 0.0, 0.06));
        }
        let segments = segment(&points);
        // The grade break at 100 m must be a segment boundary
        assert!(
            segments.iter().any(|s| (points[s.start_idx].dist_m - 100.0).abs() < 1e-9),
            "no boundary at the grade transition"
        );
        // No segment straddles the transition with a blended grade
        for s in &segments {
            assert!(
                s.avg_grade.abs() < 1e-9 || (s.avg_grade - 0.06).abs() < 0.006,
                "blended grade {}",
                s.avg_grade
            );
        }
    }

    #[test]
    fn test_heading_change_creates_boundary() {
        // Straight north, then a 90-degree turn east
        let mut points = Vec::new();
        for i in 0..=5 {
            points.push(point(i as f64 * 10.0, 0.0, 0.0, 0.0));
        }
        for i in 1..=5 {
            points.push(point(50.0 + i as f64 * 10.0, 0.0, std::f64::consts::FRAC_PI_2, 0.0));
        }
        let segments = segment(&points);
        assert!(
            segments.iter().any(|s| (points[s.start_idx].dist_m - 50.0).abs() < 10.0 + 1e-9),
            "no boundary near the corner"
        );
    }

    #[test]
    fn test_short_tail_merges() {
        // 20 m + 20 m + 3 m tail
        let mut points = uniform_track(5, 10.0, 0.0);
        points.push(point(43.0, 0.0, 0.0, 0.0));
        let segments = segment(&points);
        let last = segments.last().unwrap();
        assert!(last.length_m >= MIN_TAIL_M);
        assert_eq!(last.end_idx, 5);
        let total: f64 = segments.iter().map(|s| s.length_m).sum();
        assert!((total - 43.0).abs() < 1e-9);
    }

    #[test]
    fn test_circular_mean_wraps() {
        let points = vec![
            point(0.0, 0.0, 0.1, 0.0),
            point(10.0, 0.0, std::f64::consts::TAU - 0.1, 0.0),
        ];
        let mean = circular_mean(&points);
        assert!(mean.abs() < 1e-9, "mean across north wrap {mean}");
    }
}

use enumflags2::{BitFlags, bitflags};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Gravitational acceleration used throughout the kernel, m/s^2.
pub const GRAVITY: f64 = 9.798;

/// Helmet, shoes and bottles, added on top of rider + bike mass, kg.
pub const ADDED_MASS_KG: f64 = 1.0;

/// Road surface classes a map-matching collaborator may tag segments with.
///
/// Each class scales the rider's baseline rolling-resistance coefficient.
/// Unknown ids read as `Paved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    #[default]
    Paved,
    RoughPaved,
    Gravel,
    Dirt,
}

impl Surface {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Surface::RoughPaved,
            2 => Surface::Gravel,
            3 => Surface::Dirt,
            _ => Surface::Paved,
        }
    }

    /// Multiplier applied to the rider's baseline Crr.
    pub fn crr_factor(&self) -> f64 {
        match self {
            Surface::Paved => 1.00,
            Surface::RoughPaved => 1.15,
            Surface::Gravel => 1.60,
            Surface::Dirt => 2.10,
        }
    }
}

/// A cleaned trackpoint. Produced by the course loader; immutable afterwards.
#[derive(Debug, Clone, Copy)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    /// Smoothed elevation, meters.
    pub ele_m: f64,
    /// Cumulative distance from the course start, meters.
    pub dist_m: f64,
    /// Grade to the previous point as a ratio, clamped to [-0.25, 0.25].
    pub grade: f64,
    /// Initial bearing towards the next point, radians from north.
    pub heading_rad: f64,
    pub surface: Surface,
}

/// Columnar storage for the cleaned track.
///
/// Both input shapes (raw GPS tuples and pre-refined columnar payloads)
/// normalize to this form before the kernel sees them.
#[derive(Debug, Clone, Default)]
pub struct PointColumns {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub ele_m: Vec<f64>,
    pub dist_m: Vec<f64>,
    pub grade: Vec<f64>,
    pub heading_rad: Vec<f64>,
    pub surface: Vec<Surface>,
}

impl PointColumns {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            lat: Vec::with_capacity(n),
            lon: Vec::with_capacity(n),
            ele_m: Vec::with_capacity(n),
            dist_m: Vec::with_capacity(n),
            grade: Vec::with_capacity(n),
            heading_rad: Vec::with_capacity(n),
            surface: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.dist_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dist_m.is_empty()
    }

    pub fn push(&mut self, p: TrackPoint) {
        self.lat.push(p.lat);
        self.lon.push(p.lon);
        self.ele_m.push(p.ele_m);
        self.dist_m.push(p.dist_m);
        self.grade.push(p.grade);
        self.heading_rad.push(p.heading_rad);
        self.surface.push(p.surface);
    }

    pub fn from_points(points: &[TrackPoint]) -> Self {
        let mut columns = Self::with_capacity(points.len());
        for p in points {
            columns.push(*p);
        }
        columns
    }
}

/// Physics-unit partition of the course: a short stretch with uniform
/// grade and heading, nominally 20 m.
#[derive(Debug, Clone, Copy)]
pub struct AtomicSegment {
    /// Index of the first trackpoint covered by this segment.
    pub start_idx: usize,
    /// Index of the trackpoint at the segment's end boundary.
    pub end_idx: usize,
    pub length_m: f64,
    /// Recomputed from elevation delta over length.
    pub avg_grade: f64,
    /// Circular mean of the covered point headings, radians.
    pub avg_heading_rad: f64,
    pub surface: Surface,
}

/// The preprocessed course: cleaned points in columnar form plus the
/// atomic segments covering them. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Course {
    pub points: PointColumns,
    pub segments: Vec<AtomicSegment>,
    pub total_distance_m: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
}

/// Classification of a user segment by its average grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentKind {
    Up,
    Flat,
    Down,
}

impl SegmentKind {
    /// UP at >= +1 %, DOWN at <= -1 %, FLAT in between.
    pub fn classify(avg_grade: f64) -> Self {
        if avg_grade >= 0.01 {
            SegmentKind::Up
        } else if avg_grade <= -0.01 {
            SegmentKind::Down
        } else {
            SegmentKind::Flat
        }
    }
}

/// A named span of the course supplied by the caller, optionally carrying
/// a fixed target power that overrides the pacing policy inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSegment {
    pub id: Uuid,
    pub start_dist_m: f64,
    pub end_dist_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_power_w: Option<f64>,
}

impl UserSegment {
    pub fn contains(&self, dist_m: f64) -> bool {
        dist_m >= self.start_dist_m && dist_m < self.end_dist_m
    }
}

/// Ambient conditions for a run. Read-only input to the kernel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Environment {
    /// Air temperature, degrees Celsius.
    pub temp_c: f64,
    /// Base altitude of the course, meters.
    pub altitude_m: f64,
    /// Wind speed, m/s.
    pub wind_speed_mps: f64,
    /// Meteorological wind bearing (direction the wind blows from),
    /// radians from north.
    pub wind_bearing_rad: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temp_c: 20.0,
            altitude_m: 0.0,
            wind_speed_mps: 0.0,
            wind_bearing_rad: 0.0,
        }
    }
}

impl Environment {
    /// Temperature- and altitude-adjusted air density, kg/m^3.
    pub fn air_density(&self) -> f64 {
        (1.293 - 0.00426 * self.temp_c) * (-0.709 * self.altitude_m / 7000.0).exp()
    }

    /// Wind component along a direction of travel; positive = headwind.
    pub fn headwind_component(&self, heading_rad: f64) -> f64 {
        if self.wind_speed_mps == 0.0 {
            return 0.0;
        }
        self.wind_speed_mps * (heading_rad - self.wind_bearing_rad).cos()
    }
}

/// Per-sample kernel state flags.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SampleFlag {
    /// The walking clamp replaced the ride with a 5 km/h hike.
    Walking,
    /// The high-speed brake capped the exit speed.
    Braking,
    /// The cold-start fallback produced this sample.
    ColdStart,
}

/// Kernel output at one atomic-segment boundary. SI units internally;
/// the response layer converts to the documented km / km/h shapes.
#[derive(Debug, Clone, Copy)]
pub struct TrackSample {
    pub dist_m: f64,
    pub ele_m: f64,
    pub speed_mps: f64,
    /// Rider-side power actually delivered over the segment, W.
    pub power_w: f64,
    /// Cumulative time at the segment end, seconds.
    pub time_s: f64,
    /// Remaining anaerobic reserve, J.
    pub w_prime_j: f64,
    pub flags: BitFlags<SampleFlag>,
}

impl TrackSample {
    pub fn is_walking(&self) -> bool {
        self.flags.contains(SampleFlag::Walking)
    }
}

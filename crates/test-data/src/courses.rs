//! Synthetic course generation.
//!
//! Two flavors: exact piecewise-grade profiles for scenario replays where
//! the expected physics is known in closed form, and layered-noise terrain
//! for exercising the cleaning pipeline on realistic input. Terrain is
//! synthesized in the along-course distance domain, one noise layer per
//! scale the kernel reacts to: multi-kilometer climbs drive the pacing
//! regimes, few-hundred-meter rollers trip the segmenter's grade trigger,
//! and near-chunk-length texture is what the loader's smoothing window
//! has to absorb.

use noise::{NoiseFn, Perlin};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use pacer::errors::Result;
use pacer::loader::{self, RawTrackPoint};
use pacer::models::Course;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_000.0;

/// A deterministic course built from piecewise-constant grade legs.
///
/// The track runs in a straight line from the origin, so heading is
/// constant and the produced grades match the legs exactly (up to the
/// cleaner's smoothing at leg boundaries).
#[derive(Debug, Clone)]
pub struct GradeProfile {
    legs: Vec<(f64, f64)>,
    spacing_m: f64,
    origin: (f64, f64),
    base_elevation_m: f64,
    heading_rad: f64,
}

impl Default for GradeProfile {
    fn default() -> Self {
        Self {
            legs: Vec::new(),
            spacing_m: 10.0,
            origin: (40.0, -105.3),
            base_elevation_m: 1600.0,
            heading_rad: 0.0,
        }
    }
}

impl GradeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a leg of the given length and grade.
    pub fn leg(mut self, length_m: f64, grade: f64) -> Self {
        self.legs.push((length_m, grade));
        self
    }

    /// Sets the point spacing (default 10 m).
    pub fn with_spacing(mut self, spacing_m: f64) -> Self {
        self.spacing_m = spacing_m;
        self
    }

    /// Sets the constant direction of travel, radians from north.
    pub fn with_heading(mut self, heading_rad: f64) -> Self {
        self.heading_rad = heading_rad;
        self
    }

    /// Sets the starting coordinate.
    pub fn with_origin(mut self, lat: f64, lon: f64) -> Self {
        self.origin = (lat, lon);
        self
    }

    /// Sets the starting elevation.
    pub fn with_base_elevation(mut self, elevation_m: f64) -> Self {
        self.base_elevation_m = elevation_m;
        self
    }

    /// Generates the raw point sequence.
    pub fn points(&self) -> Vec<RawTrackPoint> {
        let (mut lat, mut lon) = self.origin;
        let mut ele = self.base_elevation_m;
        let mut points = vec![RawTrackPoint::new(lat, lon, ele)];

        for &(length_m, grade) in &self.legs {
            let mut remaining = length_m;
            while remaining > 1e-9 {
                let step = remaining.min(self.spacing_m);
                lat += (step * self.heading_rad.cos()) / METERS_PER_DEGREE;
                lon += (step * self.heading_rad.sin())
                    / (METERS_PER_DEGREE * lat.to_radians().cos());
                ele += step * grade;
                points.push(RawTrackPoint::new(lat, lon, ele));
                remaining -= step;
            }
        }
        points
    }

    /// Generates and preprocesses the course in one go.
    pub fn course(&self) -> Result<Course> {
        loader::build_course(&self.points())
    }
}

/// Elevation as a function of along-course distance.
///
/// Three Perlin layers, largest wavelength first. Amplitudes are in
/// meters of elevation, wavelengths in meters of road, so a layer's
/// typical grade is roughly `amplitude / wavelength` and the presets can
/// be read directly against the kernel's regime thresholds.
#[derive(Debug, Clone)]
pub struct TerrainProfile {
    perlin: Perlin,
    base_elevation_m: f64,
    /// (wavelength_m, amplitude_m) per layer.
    layers: [(f64, f64); 3],
}

impl TerrainProfile {
    /// Rolling terrain: sustained climbs around 2-4 % with mild rollers.
    pub fn rolling(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation_m: 400.0,
            layers: [(6_000.0, 110.0), (500.0, 7.0), (60.0, 0.4)],
        }
    }

    /// Mountain terrain: climbs long and steep enough to exercise the
    /// walking clamp on weak riders and the brake on the way back down.
    pub fn mountainous(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation_m: 1_200.0,
            layers: [(9_000.0, 380.0), (700.0, 10.0), (60.0, 0.5)],
        }
    }

    /// Nearly flat: the momentum regime end to end, texture only.
    pub fn pan_flat(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation_m: 10.0,
            layers: [(8_000.0, 6.0), (600.0, 1.5), (60.0, 0.3)],
        }
    }

    /// Sets the base elevation.
    pub fn with_base_elevation(mut self, elevation_m: f64) -> Self {
        self.base_elevation_m = elevation_m;
        self
    }

    /// Elevation at a cumulative course distance, meters.
    pub fn elevation_at(&self, dist_m: f64) -> f64 {
        let mut ele = self.base_elevation_m;
        for (channel, (wavelength_m, amplitude_m)) in self.layers.iter().enumerate() {
            // One noise channel per layer, separated on the second axis.
            let sample = self
                .perlin
                .get([dist_m / wavelength_m, channel as f64 * 7.3 + 0.5]);
            ele += amplitude_m * sample;
        }
        ele
    }

    /// Upper bound on the grade the layer stack can produce, as a ratio.
    ///
    /// Perlin slopes stay under ~3 per wavelength, so the presets land
    /// well inside the loader's grade clamp.
    pub fn grade_bound(&self) -> f64 {
        self.layers.iter().map(|(w, a)| 3.0 * a / w).sum()
    }
}

/// A meandering road over a [`TerrainProfile`], with GPS noise.
#[derive(Debug, Clone)]
pub struct ProceduralCourse {
    terrain: TerrainProfile,
    start: (f64, f64),
    distance_m: f64,
    spacing_m: f64,
    /// Maximum per-step heading change, radians.
    meander_rad: f64,
    gps_jitter_m: f64,
    elevation_jitter_m: f64,
}

impl ProceduralCourse {
    /// Creates a generator over rolling terrain.
    pub fn new(seed: u32) -> Self {
        Self {
            terrain: TerrainProfile::rolling(seed),
            start: (40.0, -105.3),
            distance_m: 5_000.0,
            spacing_m: 10.0,
            meander_rad: 0.25,
            gps_jitter_m: 3.0,
            elevation_jitter_m: 5.0,
        }
    }

    /// Sets the target distance.
    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_m = meters;
        self
    }

    /// Sets GPS position jitter.
    pub fn with_gps_jitter(mut self, meters: f64) -> Self {
        self.gps_jitter_m = meters;
        self
    }

    /// Sets the terrain profile.
    pub fn with_terrain(mut self, terrain: TerrainProfile) -> Self {
        self.terrain = terrain;
        self
    }

    /// Sets the starting coordinate.
    pub fn with_start(mut self, lat: f64, lon: f64) -> Self {
        self.start = (lat, lon);
        self
    }

    /// Generates raw trackpoints along a heading-momentum random walk.
    ///
    /// Elevation is read from the terrain profile at the nominal
    /// (pre-jitter) cumulative distance, so one seed means one set of
    /// hills no matter how noisy the fixes are.
    pub fn generate(&self, rng: &mut impl Rng) -> Vec<RawTrackPoint> {
        let pos_jitter = Normal::new(0.0, self.gps_jitter_m / METERS_PER_DEGREE).unwrap();
        let ele_jitter = Normal::new(0.0, self.elevation_jitter_m).unwrap();

        let (mut lat, mut lon) = self.start;
        let mut heading = rng.gen_range(0.0..std::f64::consts::TAU);
        let mut dist = 0.0;
        let mut points = Vec::with_capacity((self.distance_m / self.spacing_m) as usize + 1);

        while dist < self.distance_m {
            points.push(RawTrackPoint::new(
                lat + pos_jitter.sample(rng),
                lon + pos_jitter.sample(rng),
                self.terrain.elevation_at(dist) + ele_jitter.sample(rng),
            ));

            heading += rng.gen_range(-self.meander_rad..self.meander_rad);
            let step = self.spacing_m * rng.gen_range(0.8..1.2);
            lat += (step * heading.cos()) / METERS_PER_DEGREE;
            lon += (step * heading.sin()) / (METERS_PER_DEGREE * lat.to_radians().cos());
            dist += step;
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_grade_profile_distance_and_gain() {
        let course = GradeProfile::new()
            .leg(1_000.0, 0.0)
            .leg(1_000.0, 0.06)
            .course()
            .unwrap();
        assert!((course.total_distance_m - 2_000.0).abs() < 5.0);
        assert!((course.ascent_m - 60.0).abs() < 2.0);
    }

    #[test]
    fn test_grade_profile_is_deterministic() {
        let a = GradeProfile::new().leg(500.0, 0.03).points();
        let b = GradeProfile::new().leg(500.0, 0.03).points();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.lat.to_bits(), y.lat.to_bits());
            assert_eq!(x.ele_m.to_bits(), y.ele_m.to_bits());
        }
    }

    #[test]
    fn test_terrain_same_seed_same_hills() {
        let a = TerrainProfile::rolling(42);
        let b = TerrainProfile::rolling(42);
        for i in 0..100 {
            let d = i as f64 * 137.0;
            assert_eq!(a.elevation_at(d).to_bits(), b.elevation_at(d).to_bits());
        }
        let other = TerrainProfile::rolling(43);
        assert!((0..100).any(|i| {
            let d = i as f64 * 137.0;
            (a.elevation_at(d) - other.elevation_at(d)).abs() > 1.0
        }));
    }

    #[test]
    fn test_terrain_stays_within_amplitudes() {
        for terrain in [
            TerrainProfile::rolling(7),
            TerrainProfile::mountainous(7),
            TerrainProfile::pan_flat(7),
        ] {
            let total_amp: f64 = terrain.layers.iter().map(|(_, a)| a).sum();
            for i in 0..2_000 {
                let ele = terrain.elevation_at(i as f64 * 10.0);
                assert!(
                    (ele - terrain.base_elevation_m).abs() <= total_amp,
                    "elevation {ele} outside the layer amplitudes"
                );
            }
        }
    }

    #[test]
    fn test_terrain_grades_stay_under_bound() {
        let terrain = TerrainProfile::mountainous(11);
        let bound = terrain.grade_bound();
        for i in 1..2_000 {
            let d = i as f64 * 10.0;
            let grade = (terrain.elevation_at(d) - terrain.elevation_at(d - 10.0)) / 10.0;
            assert!(grade.abs() <= bound, "grade {grade} over bound {bound}");
        }
        // The bound itself must sit inside the loader's clamp for the
        // presets to survive cleaning unclamped.
        assert!(bound < 0.25);
    }

    #[test]
    fn test_procedural_course_cleans_up() {
        let mut rng = StdRng::seed_from_u64(42);
        let raw = ProceduralCourse::new(42)
            .with_distance(2_000.0)
            .generate(&mut rng);
        assert!(raw.len() > 100);
        let course = pacer::loader::build_course(&raw).unwrap();
        assert!(course.total_distance_m > 1_000.0);
        assert!(!course.segments.is_empty());
    }

    #[test]
    fn test_procedural_track_is_compact() {
        let mut rng = StdRng::seed_from_u64(9);
        let generator = ProceduralCourse::new(9).with_distance(10_000.0);
        let raw = generator.generate(&mut rng);
        let reach_deg = 1.2 * generator.distance_m / METERS_PER_DEGREE;
        for p in &raw {
            assert!((p.lat - generator.start.0).abs() < reach_deg);
            assert!((p.lon - generator.start.1).abs() < reach_deg * 1.5);
        }
    }
}

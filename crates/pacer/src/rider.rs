//! Rider physiology: power-duration curve, anaerobic reserve and
//! drivetrain efficiency.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SimulationError};
use crate::models::ADDED_MASS_KG;

/// Riegel fatigue exponent used to extrapolate the PDC beyond its
/// longest recorded duration.
const RIEGEL_EXPONENT: f64 = -0.07;

/// Duration-dependent ceiling anchors: (hours, multiple of CP).
/// Linear interpolation between anchors, saturating outside.
const DURATION_CAP_ANCHORS: [(f64, f64); 4] =
    [(1.0, 1.20), (3.0, 1.10), (5.0, 1.05), (8.0, 0.95)];

/// Closed set of drivetrain groupsets with known transmission losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Drivetrain {
    #[serde(rename = "duraAce")]
    DuraAce,
    #[default]
    #[serde(rename = "ultegra")]
    Ultegra,
    #[serde(rename = "105")]
    R105,
    #[serde(rename = "tiagra")]
    Tiagra,
    #[serde(rename = "sora")]
    Sora,
    #[serde(rename = "claris")]
    Claris,
    #[serde(rename = "sis")]
    Sis,
    #[serde(rename = "redAxs")]
    RedAxs,
    #[serde(rename = "forceAxs")]
    ForceAxs,
    #[serde(rename = "rival")]
    Rival,
    #[serde(rename = "apex")]
    Apex,
    #[serde(rename = "superRecord")]
    SuperRecord,
    #[serde(rename = "Record")]
    Record,
    #[serde(rename = "Chorus")]
    Chorus,
    #[serde(rename = "Potenza")]
    Potenza,
    #[serde(rename = "Athena")]
    Athena,
    #[serde(rename = "Veloce")]
    Veloce,
    #[serde(rename = "Centaur")]
    Centaur,
    #[serde(rename = "kForce")]
    KForce,
}

impl Drivetrain {
    /// Base mechanical efficiency of the groupset.
    pub fn base_efficiency(&self) -> f64 {
        match self {
            Drivetrain::DuraAce | Drivetrain::RedAxs | Drivetrain::SuperRecord => 0.965,
            Drivetrain::Ultegra | Drivetrain::ForceAxs | Drivetrain::Record => 0.962,
            Drivetrain::Chorus | Drivetrain::R105 | Drivetrain::KForce => 0.960,
            Drivetrain::Rival => 0.958,
            Drivetrain::Potenza => 0.957,
            Drivetrain::Tiagra | Drivetrain::Athena => 0.955,
            Drivetrain::Apex => 0.954,
            Drivetrain::Veloce => 0.952,
            Drivetrain::Sora | Drivetrain::Centaur => 0.950,
            Drivetrain::Claris => 0.945,
            Drivetrain::Sis => 0.940,
        }
    }

    /// Power-dependent efficiency: chains run slightly more efficiently
    /// under load. Input power is clamped to the measured 50-400 W range.
    pub fn efficiency(&self, power_w: f64) -> f64 {
        let p = power_w.clamp(50.0, 400.0);
        (2.1246 * p.ln() - 11.5 + 100.0 * self.base_efficiency()) / 100.0
    }
}

/// Sparse duration -> best-average-power mapping, kept sorted by duration.
#[derive(Debug, Clone)]
pub struct PowerDurationCurve {
    points: Vec<(f64, f64)>,
}

impl PowerDurationCurve {
    /// Builds a curve from (duration_s, watts) pairs.
    ///
    /// Pairs are sorted by duration and sanitized to be monotone
    /// non-increasing in power; non-positive entries are rejected.
    pub fn new(mut pairs: Vec<(f64, f64)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(SimulationError::malformed("rider.pdc", "must be non-empty"));
        }
        for (duration, watts) in &pairs {
            if !duration.is_finite() || *duration <= 0.0 || !watts.is_finite() || *watts <= 0.0 {
                return Err(SimulationError::malformed(
                    "rider.pdc",
                    format!("invalid entry ({duration} s, {watts} W)"),
                ));
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);
        let mut floor = f64::INFINITY;
        for point in pairs.iter_mut() {
            floor = floor.min(point.1);
            point.1 = floor;
        }
        Ok(Self { points: pairs })
    }

    /// Best sustainable average power for the given duration, W.
    ///
    /// Piecewise-linear in log-duration inside the curve's domain,
    /// Riegel extrapolation beyond it, saturating at the shortest
    /// duration's power below it.
    pub fn limit_power(&self, duration_s: f64) -> f64 {
        let duration_s = duration_s.max(1.0);
        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);
        if duration_s <= first.0 {
            return first.1;
        }
        if duration_s >= last.0 {
            return last.1 * (duration_s / last.0).powf(RIEGEL_EXPONENT);
        }
        let idx = self
            .points
            .partition_point(|(d, _)| *d <= duration_s)
            .min(self.points.len() - 1);
        let (d0, p0) = self.points[idx - 1];
        let (d1, p1) = self.points[idx];
        let t = (duration_s.ln() - d0.ln()) / (d1.ln() - d0.ln());
        p0 + (p1 - p0) * t
    }
}

/// Physiological and equipment profile of the rider. Read-only input.
#[derive(Debug, Clone)]
pub struct RiderProfile {
    pub mass_kg: f64,
    /// Critical power: maximal sustainable steady-state power, W.
    pub cp_w: f64,
    /// Anaerobic work capacity above CP, J.
    pub w_prime_j: f64,
    pub pdc: PowerDurationCurve,
    /// Drag area, m^2.
    pub cda_m2: f64,
    /// Baseline rolling-resistance coefficient on paved surface.
    pub crr: f64,
    pub bike_mass_kg: f64,
    pub drivetrain: Drivetrain,
}

impl RiderProfile {
    /// Rider + bike + fixed gear allowance, kg.
    pub fn total_mass_kg(&self) -> f64 {
        self.mass_kg + self.bike_mass_kg + ADDED_MASS_KG
    }

    /// Duration-dependent ceiling as a multiple of CP.
    pub fn duration_cap_factor(hours: f64) -> f64 {
        let anchors = &DURATION_CAP_ANCHORS;
        if hours <= anchors[0].0 {
            return anchors[0].1;
        }
        if hours >= anchors[anchors.len() - 1].0 {
            return anchors[anchors.len() - 1].1;
        }
        for pair in anchors.windows(2) {
            let ((h0, f0), (h1, f1)) = (pair[0], pair[1]);
            if hours <= h1 {
                return f0 + (f1 - f0) * (hours - h0) / (h1 - h0);
            }
        }
        anchors[anchors.len() - 1].1
    }

    /// Absolute power ceiling for an effort expected to last `hours`, W.
    pub fn capped_power(&self, hours: f64) -> f64 {
        Self::duration_cap_factor(hours) * self.cp_w
    }
}

/// Skiba W'-balance accumulator.
///
/// Depletes linearly above CP; recovers below CP with a time constant
/// driven by how far the recent power sits under CP.
#[derive(Debug, Clone, Copy)]
pub struct WPrimeBalance {
    capacity_j: f64,
    balance_j: f64,
    bonked: bool,
}

impl WPrimeBalance {
    pub fn new(capacity_j: f64) -> Self {
        Self {
            capacity_j,
            balance_j: capacity_j,
            bonked: false,
        }
    }

    pub fn balance_j(&self) -> f64 {
        self.balance_j
    }

    /// True once the reserve has ever gone below zero in this trial.
    pub fn bonked(&self) -> bool {
        self.bonked
    }

    /// Advances the balance over `dt_s` at `power_w`, with `recent_power_w`
    /// (a rolling mean of actual power) setting the recovery intensity.
    pub fn advance(&mut self, power_w: f64, recent_power_w: f64, cp_w: f64, dt_s: f64) {
        if power_w > cp_w {
            self.balance_j -= (power_w - cp_w) * dt_s;
        } else {
            let d_cp = (cp_w - recent_power_w).max(0.0);
            let tau = 546.0 * (-0.01 * d_cp).exp() + 316.0;
            self.balance_j += (self.capacity_j - self.balance_j) * (1.0 - (-dt_s / tau).exp());
        }
        if self.balance_j < 0.0 {
            self.bonked = true;
        }
    }
}

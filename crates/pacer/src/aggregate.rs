//! Streaming trajectory statistics.
//!
//! All aggregates are computed in a single forward pass as samples are
//! produced, so solver trials never materialize a second copy of the
//! trajectory and nothing ever looks at future state.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::models::{SampleFlag, SegmentKind, TrackSample, UserSegment};

/// Rolling-average window backing normalized power and the W' recovery
/// intensity, seconds.
pub const ROLLING_WINDOW_S: f64 = 30.0;

/// A statistic folded over the sample stream.
pub trait TrajectoryMetric {
    type Score;
    /// `dt_s` is the time spent producing this sample, `length_m` the
    /// segment length it covers.
    fn next_sample(&mut self, sample: &TrackSample, dt_s: f64, length_m: f64);
    fn finish(&self) -> Self::Score;
}

/// Exact time-weighted rolling mean over a fixed trailing window.
#[derive(Debug, Clone, Default)]
pub struct RollingAverage {
    window: VecDeque<(f64, f64)>,
    sum_dt: f64,
    sum_power_dt: f64,
}

impl RollingAverage {
    pub fn push(&mut self, dt_s: f64, power_w: f64) {
        self.window.push_back((dt_s, power_w));
        self.sum_dt += dt_s;
        self.sum_power_dt += power_w * dt_s;

        while self.sum_dt > ROLLING_WINDOW_S {
            let excess = self.sum_dt - ROLLING_WINDOW_S;
            let (front_dt, front_power) = *self.window.front().expect("window non-empty");
            if front_dt <= excess {
                self.window.pop_front();
                self.sum_dt -= front_dt;
                self.sum_power_dt -= front_power * front_dt;
            } else {
                self.window.front_mut().expect("window non-empty").0 -= excess;
                self.sum_dt -= excess;
                self.sum_power_dt -= front_power * excess;
            }
        }
    }

    pub fn mean(&self) -> f64 {
        if self.sum_dt <= 0.0 {
            return 0.0;
        }
        self.sum_power_dt / self.sum_dt
    }
}

/// Normalized power: fourth-root mean of the fourth power of the 30 s
/// rolling average of actual power.
#[derive(Debug, Clone, Default)]
pub struct NormalizedPower {
    rolling: RollingAverage,
    quartic_sum: f64,
    total_dt: f64,
}

impl TrajectoryMetric for NormalizedPower {
    type Score = f64;

    fn next_sample(&mut self, sample: &TrackSample, dt_s: f64, _length_m: f64) {
        self.rolling.push(dt_s, sample.power_w);
        self.quartic_sum += self.rolling.mean().powi(4) * dt_s;
        self.total_dt += dt_s;
    }

    fn finish(&self) -> f64 {
        if self.total_dt <= 0.0 {
            return 0.0;
        }
        (self.quartic_sum / self.total_dt).powf(0.25)
    }
}

impl NormalizedPower {
    /// Current rolling mean; doubles as the W' recovery intensity.
    pub fn rolling_mean(&self) -> f64 {
        self.rolling.mean()
    }
}

/// Accumulated figures for one user segment.
#[derive(Debug, Clone)]
pub struct UserSegmentStats {
    pub id: Uuid,
    pub kind: SegmentKind,
    pub start_dist_m: f64,
    pub end_dist_m: f64,
    pub distance_m: f64,
    pub avg_grade: f64,
    pub duration_s: f64,
    pub avg_power_w: f64,
    pub avg_speed_mps: f64,
}

#[derive(Debug, Clone, Default)]
struct SegmentAccumulator {
    duration_s: f64,
    power_dt: f64,
    distance_m: f64,
    elevation_delta_m: f64,
}

/// All per-trial statistics, folded in one pass.
#[derive(Debug, Clone)]
pub struct TrajectoryStats {
    np: NormalizedPower,
    total_time_s: f64,
    total_distance_m: f64,
    power_dt: f64,
    walking_m: f64,
    braking_m: f64,
    user_segments: Vec<UserSegment>,
    accumulators: Vec<SegmentAccumulator>,
}

/// Final aggregates for one completed trajectory.
#[derive(Debug, Clone)]
pub struct TrajectorySummary {
    pub total_time_s: f64,
    pub distance_m: f64,
    pub avg_speed_mps: f64,
    pub avg_power_w: f64,
    pub normalized_power_w: f64,
    pub work_kj: f64,
    pub walking_distance_m: f64,
    pub braking_distance_m: f64,
    pub per_user_segment: Vec<UserSegmentStats>,
}

impl TrajectoryStats {
    pub fn new(user_segments: &[UserSegment]) -> Self {
        Self {
            np: NormalizedPower::default(),
            total_time_s: 0.0,
            total_distance_m: 0.0,
            power_dt: 0.0,
            walking_m: 0.0,
            braking_m: 0.0,
            user_segments: user_segments.to_vec(),
            accumulators: vec![SegmentAccumulator::default(); user_segments.len()],
        }
    }

    /// Index of the user segment containing a course distance, if any.
    pub fn segment_index_at(&self, dist_m: f64) -> Option<usize> {
        self.user_segments.iter().position(|s| s.contains(dist_m))
    }

    /// Folds one produced sample into every statistic.
    ///
    /// `segment_start_m` is the distance at which the sample's atomic
    /// segment began; `ele_delta_m` its elevation change.
    pub fn push_sample(
        &mut self,
        sample: &TrackSample,
        dt_s: f64,
        length_m: f64,
        segment_start_m: f64,
        ele_delta_m: f64,
    ) {
        self.np.next_sample(sample, dt_s, length_m);
        self.total_time_s += dt_s;
        self.total_distance_m += length_m;
        self.power_dt += sample.power_w * dt_s;
        if sample.flags.contains(SampleFlag::Walking) {
            self.walking_m += length_m;
        }
        if sample.flags.contains(SampleFlag::Braking) {
            self.braking_m += length_m;
        }
        if let Some(idx) = self.segment_index_at(segment_start_m) {
            let acc = &mut self.accumulators[idx];
            acc.duration_s += dt_s;
            acc.power_dt += sample.power_w * dt_s;
            acc.distance_m += length_m;
            acc.elevation_delta_m += ele_delta_m;
        }
    }

    /// The 30 s rolling mean of actual power, for the W' recovery term.
    pub fn recent_power_w(&self) -> f64 {
        self.np.rolling_mean()
    }

    pub fn total_time_s(&self) -> f64 {
        self.total_time_s
    }

    pub fn normalized_power_w(&self) -> f64 {
        self.np.finish()
    }

    pub fn finish(&self) -> TrajectorySummary {
        let time = self.total_time_s;
        let per_user_segment = self
            .user_segments
            .iter()
            .zip(&self.accumulators)
            .map(|(seg, acc)| {
                let avg_grade = if acc.distance_m > 0.0 {
                    acc.elevation_delta_m / acc.distance_m
                } else {
                    0.0
                };
                UserSegmentStats {
                    id: seg.id,
                    kind: SegmentKind::classify(avg_grade),
                    start_dist_m: seg.start_dist_m,
                    end_dist_m: seg.end_dist_m,
                    distance_m: acc.distance_m,
                    avg_grade,
                    duration_s: acc.duration_s,
                    avg_power_w: if acc.duration_s > 0.0 {
                        acc.power_dt / acc.duration_s
                    } else {
                        0.0
                    },
                    avg_speed_mps: if acc.duration_s > 0.0 {
                        acc.distance_m / acc.duration_s
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        TrajectorySummary {
            total_time_s: time,
            distance_m: self.total_distance_m,
            avg_speed_mps: if time > 0.0 {
                self.total_distance_m / time
            } else {
                0.0
            },
            avg_power_w: if time > 0.0 { self.power_dt / time } else { 0.0 },
            normalized_power_w: self.np.finish(),
            work_kj: self.power_dt / 1000.0,
            walking_distance_m: self.walking_m,
            braking_distance_m: self.braking_m,
            per_user_segment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumflags2::BitFlags;

    fn sample(power_w: f64, time_s: f64) -> TrackSample {
        TrackSample {
            dist_m: 0.0,
            ele_m: 0.0,
            speed_mps: 10.0,
            power_w,
            time_s,
            w_prime_j: 0.0,
            flags: BitFlags::empty(),
        }
    }

    #[test]
    fn test_rolling_average_trims_exactly() {
        let mut rolling = RollingAverage::default();
        rolling.push(20.0, 100.0);
        rolling.push(20.0, 300.0);
        // Window holds the last 30 s: 10 s of 100 W and 20 s of 300 W
        let expected = (10.0 * 100.0 + 20.0 * 300.0) / 30.0;
        assert!((rolling.mean() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_np_equals_avg_for_constant_power() {
        let mut np = NormalizedPower::default();
        for i in 0..100 {
            np.next_sample(&sample(200.0, i as f64), 2.0, 20.0);
        }
        assert!((np.finish() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_np_exceeds_avg_for_spiky_power() {
        let mut np = NormalizedPower::default();
        let mut avg_num = 0.0;
        let mut avg_den = 0.0;
        for i in 0..200 {
            // Alternate 60 s blocks of 100 W and 300 W
            let p = if (i / 30) % 2 == 0 { 100.0 } else { 300.0 };
            np.next_sample(&sample(p, i as f64 * 2.0), 2.0, 20.0);
            avg_num += p * 2.0;
            avg_den += 2.0;
        }
        let avg = avg_num / avg_den;
        assert!(np.finish() > avg + 10.0, "np {} avg {avg}", np.finish());
    }

    #[test]
    fn test_summary_average_power_consistency() {
        let mut stats = TrajectoryStats::new(&[]);
        for i in 0..50 {
            stats.push_sample(&sample(250.0, i as f64), 2.0, 20.0, i as f64 * 20.0, 0.0);
        }
        let summary = stats.finish();
        assert!((summary.avg_power_w - 250.0).abs() < 0.5);
        assert!((summary.work_kj - 250.0 * 100.0 / 1000.0).abs() < 1e-9);
        assert!((summary.total_time_s - 100.0).abs() < 1e-9);
        assert!((summary.avg_speed_mps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_user_segment_rollup() {
        let seg = UserSegment {
            id: Uuid::new_v4(),
            start_dist_m: 100.0,
            end_dist_m: 300.0,
            target_power_w: None,
        };
        let mut stats = TrajectoryStats::new(&[seg]);
        for i in 0..25 {
            let start = i as f64 * 20.0;
            stats.push_sample(&sample(200.0, i as f64 * 2.0), 2.0, 20.0, start, 20.0 * 0.05);
        }
        let summary = stats.finish();
        let rollup = &summary.per_user_segment[0];
        // Atomic segments starting at 100..280 m fall inside
        assert!((rollup.duration_s - 20.0).abs() < 1e-9);
        assert!((rollup.avg_power_w - 200.0).abs() < 1e-9);
        assert!((rollup.avg_speed_mps - 10.0).abs() < 1e-9);
        assert_eq!(rollup.kind, SegmentKind::Up);
    }
}

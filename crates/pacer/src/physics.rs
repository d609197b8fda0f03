//! Per-atomic-segment physics: force balance, work-energy advance and the
//! low-speed, walking and braking safeguards.
//!
//! The advancer is pure: given the per-run parameters and one segment's
//! geometry it maps (entry speed, target power) to (exit speed, elapsed
//! time, delivered power). All anomalies short of non-finite state are
//! absorbed here and never reach the caller.

use enumflags2::BitFlags;

use crate::errors::{Result, SimulationError};
use crate::models::{Environment, GRAVITY, SampleFlag};
use crate::rider::{Drivetrain, RiderProfile};

/// Representative-speed floor for the propulsive-force division, m/s.
const EPS_SPEED: f64 = 0.2;

/// Below this entry speed the work-energy step is unreliable and the
/// cold-start fallback takes over (3 km/h).
const COLD_START_BELOW_MPS: f64 = 3.0 / 3.6;

/// Launch ceiling for a standing start: one atomic segment is not enough
/// road to spin up to cruise speed (8 km/h).
const COLD_EXIT_CAP_MPS: f64 = 8.0 / 3.6;

/// Hike-a-bike pace (5 km/h).
pub const WALK_SPEED_MPS: f64 = 5.0 / 3.6;

/// Walking engages on climbs whose sustainable speed falls below this
/// (5.5 km/h); the margin over the walking pace keeps the decision stable
/// from segment to segment.
const WALK_ENGAGE_MPS: f64 = 5.5 / 3.6;

/// Metabolic cost charged while pushing the bike, W.
pub const WALK_POWER_W: f64 = 30.0;

/// Descent speed above which the soft-wall brake may engage (50 km/h).
const BRAKE_TRIGGER_MPS: f64 = 50.0 / 3.6;

/// Default soft-wall descent cap (65 km/h).
pub const DEFAULT_BRAKE_CAP_MPS: f64 = 65.0 / 3.6;

/// Absolute speed ceiling (100 km/h).
pub const MAX_SPEED_MPS: f64 = 100.0 / 3.6;

/// Newton-Raphson settings for the steady-state solve.
const NR_INITIAL_GUESS_MPS: f64 = 20.0 / 3.6;
const NR_TOLERANCE_MPS: f64 = 0.05;
const NR_MAX_ITERATIONS: usize = 10;

/// Per-run physical constants, fixed across all solver trials.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsParams {
    /// Rider + bike + gear, kg.
    pub mass_kg: f64,
    pub cda_m2: f64,
    /// Baseline Crr; multiplied per segment by the surface factor.
    pub crr: f64,
    /// Air density for the run, kg/m^3.
    pub rho: f64,
    pub drivetrain: Drivetrain,
    /// Soft-wall descent cap, m/s.
    pub brake_cap_mps: f64,
}

impl PhysicsParams {
    pub fn new(rider: &RiderProfile, env: &Environment) -> Self {
        Self {
            mass_kg: rider.total_mass_kg(),
            cda_m2: rider.cda_m2,
            crr: rider.crr,
            rho: env.air_density(),
            drivetrain: rider.drivetrain,
            brake_cap_mps: DEFAULT_BRAKE_CAP_MPS,
        }
    }

    pub fn with_brake_cap(mut self, cap_mps: f64) -> Self {
        self.brake_cap_mps = cap_mps;
        self
    }

    /// Tire-grip proxy: maximum force the drivetrain may put down, N.
    fn max_propulsive_force(&self) -> f64 {
        1.5 * self.mass_kg * GRAVITY
    }
}

/// One atomic segment's geometry as the advancer sees it.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub length_m: f64,
    /// Grade as a ratio.
    pub grade: f64,
    /// Wind component along the direction of travel; positive = headwind.
    pub headwind_mps: f64,
    /// Surface-adjusted rolling-resistance coefficient.
    pub crr: f64,
}

/// Outcome of advancing one segment.
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    pub exit_speed_mps: f64,
    pub dt_s: f64,
    /// Rider-side power actually delivered, W.
    pub power_w: f64,
    pub flags: BitFlags<SampleFlag>,
}

/// Gravity component along the road, N. Negative on descents.
fn gravity_force(params: &PhysicsParams, grade: f64) -> f64 {
    let sin_theta = grade / (1.0 + grade * grade).sqrt();
    params.mass_kg * GRAVITY * sin_theta
}

/// Rolling resistance, N.
fn rolling_force(params: &PhysicsParams, grade: f64, crr: f64) -> f64 {
    let cos_theta = 1.0 / (1.0 + grade * grade).sqrt();
    params.mass_kg * GRAVITY * cos_theta * crr
}

/// Sign-preserving aerodynamic drag at ground speed `v`, N.
fn aero_force(params: &PhysicsParams, v: f64, headwind_mps: f64) -> f64 {
    let air = v + headwind_mps;
    0.5 * params.rho * params.cda_m2 * air * air.abs()
}

/// Total resistive force at ground speed `v`, N.
fn resistive_force(params: &PhysicsParams, step: &Step, v: f64) -> f64 {
    gravity_force(params, step.grade)
        + rolling_force(params, step.grade, step.crr)
        + aero_force(params, v, step.headwind_mps)
}

/// Steady-state speed sustaining `wheel_power_w` against the segment's
/// resistances, via Newton-Raphson. Returns 0.0 if the iteration does
/// not converge within the budget.
pub fn steady_state_speed(params: &PhysicsParams, step: &Step, wheel_power_w: f64) -> f64 {
    let f_fixed = gravity_force(params, step.grade) + rolling_force(params, step.grade, step.crr);
    let c = 0.5 * params.rho * params.cda_m2;

    let mut v = NR_INITIAL_GUESS_MPS;
    for _ in 0..NR_MAX_ITERATIONS {
        let air = v + step.headwind_mps;
        let f = v * (c * air * air.abs() + f_fixed) - wheel_power_w;
        let df = c * air * air.abs() + 2.0 * c * v * air.abs() + f_fixed;
        if df.abs() < 1e-9 {
            return 0.0;
        }
        let next = (v - f / df).max(EPS_SPEED);
        if (next - v).abs() < NR_TOLERANCE_MPS {
            return next;
        }
        v = next;
    }
    0.0
}

/// Rider-side power needed to hold `speed_mps` on this segment, W.
///
/// Returns 0 where gravity alone exceeds the target (no pedaling needed).
pub fn power_to_hold_speed(params: &PhysicsParams, step: &Step, speed_mps: f64) -> f64 {
    let wheel = speed_mps * resistive_force(params, step, speed_mps);
    if wheel <= 0.0 {
        return 0.0;
    }
    wheel / params.drivetrain.efficiency(wheel)
}

/// Advances one atomic segment.
pub fn advance(
    params: &PhysicsParams,
    step: &Step,
    entry_speed_mps: f64,
    target_power_w: f64,
    segment_index: usize,
) -> Result<StepResult> {
    let eta = params.drivetrain.efficiency(target_power_w);
    let wheel_power = eta * target_power_w;
    let mut flags = BitFlags::empty();

    let mut exit_speed = if entry_speed_mps < COLD_START_BELOW_MPS && wheel_power > 0.0 {
        // The 1/v propulsive-force singularity makes the work-energy step
        // meaningless from a near-standstill; solve the sustainable speed
        // instead and cap the launch.
        flags |= SampleFlag::ColdStart;
        steady_state_speed(params, step, wheel_power).min(COLD_EXIT_CAP_MPS)
    } else {
        let f_resist = resistive_force(params, step, entry_speed_mps);
        let f_prop = (wheel_power / entry_speed_mps.max(EPS_SPEED))
            .min(params.max_propulsive_force());
        let accel = (f_prop - f_resist) / params.mass_kg;
        (entry_speed_mps * entry_speed_mps + 2.0 * accel * step.length_m)
            .max(0.0)
            .sqrt()
    };

    // Walking clamp: climbs too steep to ride become a 5 km/h hike. The
    // decision latches on the sustainable speed so a whole hike-a-bike
    // pitch walks instead of flapping between riding and stalling.
    let mut walking = false;
    if step.grade > 0.0 {
        let transient_stall = exit_speed < WALK_SPEED_MPS;
        let unsustainable = exit_speed.min(entry_speed_mps.max(EPS_SPEED)) < WALK_ENGAGE_MPS
            && steady_state_speed(params, step, wheel_power) < WALK_ENGAGE_MPS;
        if transient_stall || unsustainable {
            walking = true;
            flags |= SampleFlag::Walking;
            exit_speed = WALK_SPEED_MPS;
        }
    }

    // Soft-wall brake on fast coasted descents.
    if !walking
        && step.grade < 0.0
        && target_power_w == 0.0
        && exit_speed > BRAKE_TRIGGER_MPS
        && exit_speed > params.brake_cap_mps
    {
        flags |= SampleFlag::Braking;
        exit_speed = params.brake_cap_mps;
    }

    exit_speed = exit_speed.min(MAX_SPEED_MPS);

    let dt = 2.0 * step.length_m / (entry_speed_mps + exit_speed);
    if !(dt.is_finite() && dt > 0.0) {
        return Err(SimulationError::NumericalInstability {
            segment: segment_index,
            quantity: "elapsed time",
        });
    }

    let power = if walking {
        WALK_POWER_W
    } else if target_power_w <= 0.0 {
        // Coasting: the brakes absorb whatever the hill supplies.
        0.0
    } else {
        // Work actually delivered to the wheel over the segment, with the
        // resistances taken at the average speed, mapped back through the
        // drivetrain to rider-side power.
        let v_avg = 0.5 * (entry_speed_mps + exit_speed);
        let kinetic = 0.5
            * params.mass_kg
            * (exit_speed * exit_speed - entry_speed_mps * entry_speed_mps);
        let wheel_work = kinetic + resistive_force(params, step, v_avg) * step.length_m;
        (wheel_work / (eta * dt)).max(0.0)
    };

    if !(exit_speed.is_finite() && power.is_finite()) {
        return Err(SimulationError::NumericalInstability {
            segment: segment_index,
            quantity: "exit speed",
        });
    }

    Ok(StepResult {
        exit_speed_mps: exit_speed,
        dt_s: dt,
        power_w: power,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleFlag;
    use crate::rider::{Drivetrain, PowerDurationCurve};

    fn reference_rider() -> RiderProfile {
        RiderProfile {
            mass_kg: 70.0,
            cp_w: 280.0,
            w_prime_j: 20_000.0,
            pdc: PowerDurationCurve::new(vec![(60.0, 450.0), (3600.0, 300.0)]).unwrap(),
            cda_m2: 0.32,
            crr: 0.004,
            bike_mass_kg: 8.0,
            drivetrain: Drivetrain::Ultegra,
        }
    }

    fn flat_params() -> PhysicsParams {
        // 15.96 C at sea level gives the canonical 1.225 kg/m^3
        let env = Environment {
            temp_c: 15.96,
            ..Default::default()
        };
        PhysicsParams::new(&reference_rider(), &env)
    }

    fn step(grade: f64) -> Step {
        Step {
            length_m: 20.0,
            grade,
            headwind_mps: 0.0,
            crr: 0.004,
        }
    }

    #[test]
    fn test_steady_state_flat_200w() {
        let params = flat_params();
        let eta = Drivetrain::Ultegra.efficiency(200.0);
        let v = steady_state_speed(&params, &step(0.0), eta * 200.0);
        // ~33-34 km/h for 79 kg, CdA 0.32, rho 1.225
        assert!(v > 9.0 && v < 9.8, "steady speed {v} m/s");
    }

    #[test]
    fn test_cold_start_launch_window() {
        let params = flat_params();
        let result = advance(&params, &step(0.0), 0.0, 200.0, 0).unwrap();
        assert!(result.flags.contains(SampleFlag::ColdStart));
        let kmh = result.exit_speed_mps * 3.6;
        assert!((4.0..=10.0).contains(&kmh), "launch speed {kmh} km/h");
        assert!(result.dt_s > 0.0);
    }

    #[test]
    fn test_cruise_holds_steady_speed() {
        let params = flat_params();
        let eta = Drivetrain::Ultegra.efficiency(200.0);
        let v_ss = steady_state_speed(&params, &step(0.0), eta * 200.0);
        let result = advance(&params, &step(0.0), v_ss, 200.0, 0).unwrap();
        assert!((result.exit_speed_mps - v_ss).abs() < 0.1);
        assert!((result.power_w - 200.0).abs() < 2.0, "power {}", result.power_w);
    }

    #[test]
    fn test_walking_on_hike_a_bike_grade() {
        let mut rider = reference_rider();
        rider.mass_kg = 85.0;
        let env = Environment::default();
        let params = PhysicsParams::new(&rider, &env);
        let steep = Step {
            length_m: 20.0,
            grade: 0.18,
            headwind_mps: 0.0,
            crr: 0.004,
        };

        // First segment from a standstill, then sustained walking
        let first = advance(&params, &steep, 0.0, 250.0, 0).unwrap();
        assert!(first.flags.contains(SampleFlag::Walking));
        assert!((first.exit_speed_mps - WALK_SPEED_MPS).abs() < 1e-9);
        assert!((first.power_w - WALK_POWER_W).abs() < 1e-9);

        let next = advance(&params, &steep, first.exit_speed_mps, 250.0, 1).unwrap();
        assert!(next.flags.contains(SampleFlag::Walking));
        assert!((next.dt_s - 20.0 / WALK_SPEED_MPS).abs() < 1e-9);
    }

    #[test]
    fn test_no_walking_on_ridable_climb() {
        let params = flat_params();
        let climb = Step {
            length_m: 20.0,
            grade: 0.06,
            headwind_mps: 0.0,
            crr: 0.004,
        };
        let result = advance(&params, &climb, 4.5, 300.0, 0).unwrap();
        assert!(!result.flags.contains(SampleFlag::Walking));
        assert!(result.exit_speed_mps * 3.6 >= 5.0);
    }

    #[test]
    fn test_brake_caps_coasted_descent() {
        let params = flat_params().with_brake_cap(15.0);
        let descent = Step {
            length_m: 20.0,
            grade: -0.08,
            headwind_mps: 0.0,
            crr: 0.004,
        };
        let result = advance(&params, &descent, 16.0, 0.0, 0).unwrap();
        assert!(result.flags.contains(SampleFlag::Braking));
        assert!((result.exit_speed_mps - 15.0).abs() < 1e-9);
        assert_eq!(result.power_w, 0.0);
    }

    #[test]
    fn test_descent_terminal_speed_stays_under_default_cap() {
        let params = flat_params();
        let descent = Step {
            length_m: 20.0,
            grade: -0.08,
            headwind_mps: 0.0,
            crr: 0.004,
        };
        let mut v = 0.0;
        for i in 0..200 {
            v = advance(&params, &descent, v, 0.0, i).unwrap().exit_speed_mps;
        }
        assert!(v <= params.brake_cap_mps + 1e-9);
        assert!(v * 3.6 > 55.0, "terminal {} km/h", v * 3.6);
    }

    #[test]
    fn test_energy_balance_identity() {
        let params = flat_params();
        let result = advance(&params, &step(0.0), 7.0, 250.0, 0).unwrap();
        let eta = Drivetrain::Ultegra.efficiency(250.0);
        let v_avg = 0.5 * (7.0 + result.exit_speed_mps);
        let kinetic = 0.5
            * params.mass_kg
            * (result.exit_speed_mps * result.exit_speed_mps - 49.0);
        let resist_work = resistive_force(&params, &step(0.0), v_avg) * 20.0;
        let delivered = eta * result.power_w * result.dt_s;
        let balance = (kinetic + resist_work - delivered).abs() / delivered;
        assert!(balance < 0.01, "energy residual {balance}");
    }

    #[test]
    fn test_headwind_slows_tailwind_speeds() {
        let params = flat_params();
        let head = Step {
            headwind_mps: 3.0,
            ..step(0.0)
        };
        let tail = Step {
            headwind_mps: -3.0,
            ..step(0.0)
        };
        let eta = Drivetrain::Ultegra.efficiency(200.0);
        let v_head = steady_state_speed(&params, &head, eta * 200.0);
        let v_tail = steady_state_speed(&params, &tail, eta * 200.0);
        let v_calm = steady_state_speed(&params, &step(0.0), eta * 200.0);
        assert!(v_head < v_calm && v_calm < v_tail);
    }

    #[test]
    fn test_coasting_from_standstill_on_flat_is_instability() {
        let params = flat_params();
        assert!(matches!(
            advance(&params, &step(0.0), 0.0, 0.0, 7),
            Err(SimulationError::NumericalInstability { segment: 7, .. })
        ));
    }

    #[test]
    fn test_coasting_from_standstill_on_descent_rolls() {
        let params = flat_params();
        let descent = Step {
            length_m: 20.0,
            grade: -0.08,
            headwind_mps: 0.0,
            crr: 0.004,
        };
        let result = advance(&params, &descent, 0.0, 0.0, 0).unwrap();
        assert!(result.exit_speed_mps > 3.0);
        assert_eq!(result.power_w, 0.0);
    }
}

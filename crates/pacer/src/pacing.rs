//! Grade-aware pacing: maps base power and local grade to a per-segment
//! target, spending harder into climbs and recovering on descents.

use crate::physics::{self, PhysicsParams, Step};

/// Extra effort per unit of climb grade: at 4 % the target is
/// `base * (1 + 2.5 * 0.04)` = 110 % of base.
const UPHILL_GAIN: f64 = 2.5;

/// Below this grade the rider stops pedaling entirely (-2 %).
const RECOVERY_GRADE: f64 = -0.02;

/// Floor for flat/gentle-downhill effort as a fraction of base power.
const MOMENTUM_FLOOR: f64 = 0.8;

/// Speed worth defending on flats and gentle descents (35 km/h).
const MOMENTUM_SPEED_MPS: f64 = 35.0 / 3.6;

/// Target power for one atomic segment.
///
/// `cap_w` is the duration-dependent ceiling (a multiple of CP) supplied
/// by the solver from its current finish-time estimate. An explicit
/// `override_w` from a user segment replaces the policy output verbatim.
pub fn target_power(
    params: &PhysicsParams,
    step: &Step,
    base_power_w: f64,
    cap_w: f64,
    override_w: Option<f64>,
) -> f64 {
    if let Some(power) = override_w {
        return power.max(0.0);
    }

    let grade = step.grade;
    if grade < RECOVERY_GRADE {
        return 0.0;
    }

    let raw = if grade > 0.0 {
        base_power_w * (1.0 + UPHILL_GAIN * grade)
    } else {
        let hold = physics::power_to_hold_speed(params, step, MOMENTUM_SPEED_MPS);
        (MOMENTUM_FLOOR * base_power_w).max(hold)
    };

    raw.min(cap_w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Environment;
    use crate::rider::{Drivetrain, PowerDurationCurve, RiderProfile};

    fn params() -> PhysicsParams {
        let rider = RiderProfile {
            mass_kg: 70.0,
            cp_w: 280.0,
            w_prime_j: 20_000.0,
            pdc: PowerDurationCurve::new(vec![(60.0, 450.0), (3600.0, 300.0)]).unwrap(),
            cda_m2: 0.32,
            crr: 0.004,
            bike_mass_kg: 8.0,
            drivetrain: Drivetrain::Ultegra,
        };
        PhysicsParams::new(&rider, &Environment::default())
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
    fn test_uphill_scales_with_grade() {
        let p = params();
        let target = target_power(&p, &step(0.06), 200.0, 1000.0, None);
        assert!((target - 200.0 * 1.15).abs() < 1e-9);
    }

    #[test]
    fn test_uphill_respects_duration_cap() {
        let p = params();
        let target = target_power(&p, &step(0.10), 300.0, 320.0, None);
        assert!((target - 320.0).abs() < 1e-9);
    }

    #[test]
    fn test_steep_descent_coasts() {
        let p = params();
        assert_eq!(target_power(&p, &step(-0.05), 250.0, 1000.0, None), 0.0);
    }

    #[test]
    fn test_momentum_floor_on_flat() {
        let p = params();
        // Holding 35 km/h on the flat takes ~190 W for this rider, which
        // beats 80 % of a 150 W base.
        let target = target_power(&p, &step(0.0), 150.0, 1000.0, None);
        assert!(target > 0.8 * 150.0);
        // With a big base, the 80 % floor wins instead.
        let target = target_power(&p, &step(0.0), 400.0, 1000.0, None);
        assert!((target - 320.0).abs() < 1e-9);
    }

    #[test]
    fn test_gentle_descent_keeps_momentum() {
        let p = params();
        let target = target_power(&p, &step(-0.01), 250.0, 1000.0, None);
        assert!(target > 0.0);
    }

    #[test]
    fn test_override_is_verbatim() {
        let p = params();
        let target = target_power(&p, &step(0.06), 200.0, 250.0, Some(400.0));
        assert!((target - 400.0).abs() < 1e-9);
        assert_eq!(target_power(&p, &step(0.06), 200.0, 250.0, Some(-5.0)), 0.0);
    }
}

//! Athlete profile presets.
//!
//! Physiology numbers follow typical published figures for each tier;
//! every preset carries a monotone PDC so the kernel's sanitization is a
//! no-op on them.

use pacer::rider::{Drivetrain, PowerDurationCurve, RiderProfile};

fn pdc(pairs: &[(f64, f64)]) -> PowerDurationCurve {
    PowerDurationCurve::new(pairs.to_vec()).expect("preset PDC is valid")
}

/// Weekend rider: ~2.6 W/kg at threshold.
pub fn recreational() -> RiderProfile {
    RiderProfile {
        mass_kg: 78.0,
        cp_w: 200.0,
        w_prime_j: 15_000.0,
        pdc: pdc(&[(60.0, 330.0), (300.0, 260.0), (1200.0, 225.0), (3600.0, 208.0)]),
        cda_m2: 0.36,
        crr: 0.0045,
        bike_mass_kg: 9.0,
        drivetrain: Drivetrain::Tiagra,
    }
}

/// Trained amateur racer: ~4 W/kg at threshold.
pub fn competitive() -> RiderProfile {
    RiderProfile {
        mass_kg: 70.0,
        cp_w: 280.0,
        w_prime_j: 20_000.0,
        pdc: pdc(&[(60.0, 450.0), (300.0, 380.0), (1200.0, 330.0), (3600.0, 300.0)]),
        cda_m2: 0.32,
        crr: 0.004,
        bike_mass_kg: 8.0,
        drivetrain: Drivetrain::Ultegra,
    }
}

/// Long-distance specialist; the PDC's Riegel tail lands at ~258 W for a
/// seven-hour effort.
pub fn stage_racer() -> RiderProfile {
    RiderProfile {
        mass_kg: 70.0,
        cp_w: 281.0,
        w_prime_j: 22_000.0,
        pdc: pdc(&[
            (120.0, 420.0),
            (300.0, 365.0),
            (600.0, 330.0),
            (1200.0, 310.0),
            (3600.0, 296.0),
        ]),
        cda_m2: 0.32,
        crr: 0.004,
        bike_mass_kg: 8.0,
        drivetrain: Drivetrain::Ultegra,
    }
}

/// Elite racer: ~5.2 W/kg at threshold.
pub fn elite() -> RiderProfile {
    RiderProfile {
        mass_kg: 66.0,
        cp_w: 340.0,
        w_prime_j: 25_000.0,
        pdc: pdc(&[(60.0, 560.0), (300.0, 450.0), (1200.0, 390.0), (3600.0, 360.0)]),
        cda_m2: 0.30,
        crr: 0.0035,
        bike_mass_kg: 7.2,
        drivetrain: Drivetrain::DuraAce,
    }
}

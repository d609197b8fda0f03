//! Synthetic data generation for pacer.
//!
//! This crate builds deterministic courses and rider profiles for
//! integration tests and benchmarks: exact piecewise-grade profiles for
//! scenario replays, layered-noise terrain sampled along the course
//! distance for realistic preprocessing input, and athlete presets
//! spanning recreational to elite physiology.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let course = GradeProfile::new()
//!     .leg(5_000.0, 0.0)
//!     .leg(3_500.0, 0.06)
//!     .leg(3_500.0, -0.06)
//!     .course()?;
//! let rider = riders::competitive();
//! ```

pub mod courses;
pub mod riders;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::courses::{GradeProfile, ProceduralCourse, TerrainProfile};
    pub use crate::riders;
}

use thiserror::Error;

use crate::solver::Trial;

/// Process exit code for the CLI: success.
pub const EXIT_OK: i32 = 0;
/// Process exit code for the CLI: malformed input.
pub const EXIT_MALFORMED: i32 = 64;
/// Process exit code for the CLI: no feasible pacing exists.
pub const EXIT_INFEASIBLE: i32 = 65;
/// Process exit code for the CLI: numerical failure.
pub const EXIT_NUMERICAL: i32 = 70;

#[derive(Error, Debug)]
pub enum SimulationError {
    /// Missing or invalid input field; carries the offending path.
    #[error("Malformed input at `{path}`: {reason}")]
    MalformedInput { path: String, reason: String },

    /// Fewer than 2 trackpoints survived cleaning.
    #[error("Empty course: {0} points after cleaning (need at least 2)")]
    EmptyCourse(usize),

    /// GPX document could not be parsed.
    #[error("GPX parsing error: {0}")]
    GpxParsing(String),

    /// The solver found no base power >= 10 W that avoids W' depletion.
    /// Carries the closest-to-feasible trial for diagnostics.
    #[error("Infeasible course: no sustainable pacing found")]
    InfeasibleCourse { closest: Box<Trial> },

    /// A non-finite value survived the in-kernel safeguards.
    #[error("Numerical instability in segment {segment}: {quantity} is not finite")]
    NumericalInstability { segment: usize, quantity: &'static str },

    /// Solver deadline elapsed before any feasible trial completed.
    #[error("Deadline exceeded before a feasible pacing was found")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationError {
    /// Maps the error taxonomy onto the documented CLI exit codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimulationError::MalformedInput { .. }
            | SimulationError::EmptyCourse(_)
            | SimulationError::GpxParsing(_)
            | SimulationError::Io(_) => EXIT_MALFORMED,
            SimulationError::InfeasibleCourse { .. } | SimulationError::DeadlineExceeded => {
                EXIT_INFEASIBLE
            }
            SimulationError::NumericalInstability { .. } => EXIT_NUMERICAL,
        }
    }

    /// Shorthand for input-shape failures.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SimulationError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;

//! Wire-facing payload types: what collaborators send in and get back.

pub mod requests;
pub mod responses;

pub use requests::{CourseInput, EnvironmentSpec, RiderSpec, SimulationRequest};
pub use responses::{DiagnosticsResponse, SimulationResponse, TrackSampleResponse};

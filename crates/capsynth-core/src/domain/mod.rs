//! Core domain types shared by every synthesis phase.

pub mod assessment;
pub mod digest;
pub mod error;
pub mod request;
pub mod trajectory;

pub use assessment::{AssessmentSource, Complexity, GapAssessment};
pub use digest::sha256_hex;
pub use error::{ConfigError, Result, SynthError};
pub use request::{CapabilityRequest, RequestKey};
pub use trajectory::{StepType, Trajectory, TrajectoryStep};

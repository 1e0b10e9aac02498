//! Capability synthesis core library.
//!
//! Detects capability gaps in a request, synthesizes Rhai modules to fill
//! them, validates and self-corrects candidates, tests live instances and
//! keeps a registry of working capabilities.

pub mod artifact;
pub mod codegen;
pub mod config;
pub mod domain;
pub mod gap;
pub mod harness;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod runtime;
pub mod synth;
pub mod telemetry;
pub mod validator;

pub use artifact::{read_trajectory_artifact, write_trajectory_artifact, TrajectoryArtifact};
pub use codegen::{
    CodeGenError, CodeGenService, GenerationRequest, HttpCodeGenClient, PromptKind, ServiceConfig,
};
pub use config::{CapsynthConfig, HarnessConfig, RegistryConfig, RuntimeConfig};
pub use domain::{
    AssessmentSource, CapabilityRequest, ConfigError, GapAssessment, Result, StepType,
    SynthError, Trajectory, TrajectoryStep,
};
pub use gap::GapAssessor;
pub use harness::{build_suite, TestHarness, TestRunResult, TestSuite};
pub use orchestrator::{IterationOutcome, IterationResult, Orchestrator, OrchestratorConfig};
pub use progress::{ProgressSink, ProgressUpdate};
pub use registry::{CapabilityListing, CapabilityRegistry, RegistryError};
pub use runtime::{CapabilityInstance, CapabilityRuntime, FaultKind, LoadError, RuntimeLimits};
pub use synth::{Candidate, Category, CodeSynthesizer, SynthesisPolicy};
pub use validator::{ValidationOutcome, ValidationPolicy, ValidatorLoader};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

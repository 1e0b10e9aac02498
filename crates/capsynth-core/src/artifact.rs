//! Trajectory artifact persistence.
//!
//! A [`TrajectoryArtifact`] is a content-verified record of one orchestrator
//! run: its steps, outcome and a SHA-256 digest of the step list. Artifacts
//! are written to `<dir>/<run_id>/trajectory.json` with a companion
//! `<dir>/<run_id>/trajectory.digest` file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{sha256_hex, Result, SynthError, TrajectoryStep};
use crate::orchestrator::IterationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryArtifact {
    pub run_id: String,
    pub request: String,
    pub success: bool,
    pub iterations_used: u32,
    /// Module that satisfied the request, if one was synthesized.
    pub module_name: Option<String>,
    pub written_at: DateTime<Utc>,
    pub steps: Vec<TrajectoryStep>,
    pub summary: String,
    /// SHA-256 hex digest of `serde_json::to_vec(&steps)`.
    pub steps_digest: String,
    pub step_count: usize,
}

impl TrajectoryArtifact {
    pub fn from_result(result: &IterationResult, request: &str) -> Result<Self> {
        let steps = result.trajectory.clone();
        let steps_digest = sha256_hex(&serde_json::to_vec(&steps)?);
        Ok(Self {
            run_id: result.run_id.clone(),
            request: request.to_string(),
            success: result.success,
            iterations_used: result.iterations_used,
            module_name: result
                .final_result
                .as_ref()
                .and_then(|o| o.module_name.clone()),
            written_at: Utc::now(),
            step_count: steps.len(),
            steps,
            summary: result.trajectory_summary.clone(),
            steps_digest,
        })
    }
}

/// Write `artifact` to `<dir>/<run_id>/trajectory.json` and its digest
/// alongside. Returns the path to `trajectory.json`.
pub fn write_trajectory_artifact(artifact: &TrajectoryArtifact, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&artifact.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let json_path = run_dir.join("trajectory.json");
    std::fs::write(&json_path, serde_json::to_vec_pretty(artifact)?)?;
    std::fs::write(
        run_dir.join("trajectory.digest"),
        artifact.steps_digest.as_bytes(),
    )?;

    Ok(json_path)
}

/// Read and verify the artifact for `run_id`.
///
/// Fails with [`SynthError::DigestMismatch`] when the recomputed step digest
/// differs from the embedded one, or the embedded one differs from the
/// companion `trajectory.digest` file.
pub fn read_trajectory_artifact(run_id: &str, dir: &Path) -> Result<TrajectoryArtifact> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join("trajectory.json"))?;
    let artifact: TrajectoryArtifact = serde_json::from_slice(&json)?;

    let recorded = std::fs::read_to_string(run_dir.join("trajectory.digest"))?;
    let recorded = recorded.trim();
    if recorded != artifact.steps_digest {
        return Err(SynthError::DigestMismatch {
            expected: recorded.to_string(),
            actual: artifact.steps_digest.clone(),
        });
    }

    let actual = sha256_hex(&serde_json::to_vec(&artifact.steps)?);
    if actual != artifact.steps_digest {
        return Err(SynthError::DigestMismatch {
            expected: artifact.steps_digest.clone(),
            actual,
        });
    }

    Ok(artifact)
}

//! Solver invocation
//!
//! The structural solver is a black box: it reads the parameter table from
//! the workspace, runs the superstructure design and the time-history
//! analysis, and writes fixed-name time-series tables to the output
//! directory. Each invocation returns a closed [`SolverOutcome`] so the retry
//! policy can branch exhaustively instead of matching on error types.

mod process;

pub use process::{
    ProcessSolver, EXIT_COMPLEX_FRICTION, EXIT_DESIGN_INFEASIBLE, EXIT_NEGATIVE_FRICTION, STATUS_FILE,
};

use crate::ground_motion::GroundMotionRecord;
use crate::sample::ParameterSet;
use crate::workspace::ArtifactWorkspace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one converged-or-not analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    /// Solver status: 0 converged, negative accepted failure, positive unresolved.
    pub status: i32,
    /// Fundamental period of the isolated structure, when the solver reports it.
    pub fundamental_period: Option<f64>,
    /// Scale factor the analysis actually applied.
    pub scale_factor: f64,
}

/// Why a sample was dropped without producing a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Ground motion would need more scaling than the ceiling allows.
    ExcessiveScale {
        /// Required factor
        scale_factor: f64,
        /// Configured ceiling
        ceiling: f64,
    },
    /// Bearing design produced negative friction coefficients.
    NegativeFriction,
    /// Bearing design produced complex friction coefficients.
    ComplexFriction,
    /// No structural section satisfies the strength/stability checks.
    DesignInfeasible,
    /// Output artifacts were missing or unreadable.
    ExtractionAnomaly(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExcessiveScale {
                scale_factor,
                ceiling,
            } => write!(f, "scale factor {scale_factor:.2} exceeds ceiling {ceiling:.2}"),
            Self::NegativeFriction => f.write_str("bearing design returned negative friction coefficients"),
            Self::ComplexFriction => f.write_str("bearing design returned complex friction coefficients"),
            Self::DesignInfeasible => f.write_str("no section satisfies design constraints"),
            Self::ExtractionAnomaly(reason) => write!(f, "extraction failed: {reason}"),
        }
    }
}

/// Outcome of a single solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverOutcome {
    /// Analysis ran; status may still be non-converged.
    Ok(AttemptResult),
    /// Sample cannot be analysed; do not retry.
    Skip(SkipReason),
    /// Solver could not be run at all.
    Fatal(String),
}

/// External structural solver.
///
/// Implementors provide [`Solver::run`]; callers use [`Solver::invoke`], which
/// rewrites the input table and empties the output directory first so an
/// attempt can only ever see its own artifacts.
pub trait Solver: Send + Sync {
    /// Run the analysis against an already-prepared workspace.
    fn run(
        &self,
        workspace: &ArtifactWorkspace,
        ground_motion: &GroundMotionRecord,
        time_step: f64,
    ) -> SolverOutcome;

    /// Prepare the workspace for `params` and run one attempt.
    fn invoke(
        &self,
        workspace: &ArtifactWorkspace,
        params: &ParameterSet,
        ground_motion: &GroundMotionRecord,
        time_step: f64,
    ) -> SolverOutcome {
        if let Err(e) = workspace.clear_outputs() {
            return SolverOutcome::Fatal(format!("cannot clear solver outputs: {e}"));
        }
        if let Err(e) = workspace.write_parameters(params) {
            return SolverOutcome::Fatal(format!("cannot write solver input: {e}"));
        }
        self.run(workspace, ground_motion, time_step)
    }
}

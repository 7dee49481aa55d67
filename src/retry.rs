//! Retry policy
//!
//! Wraps the solver with a descending time-step ladder:
//!
//! ```text
//! Attempt(0.005) --status>0--> Attempt(0.001) --status>0--> Attempt(0.0005) --> Resolved
//!       |                            |                              |
//!       +--status<=0--> Resolved     +--status<=0--> Resolved       |
//!       +--Skip-------> Skipped (no record, no further attempts) <--+
//! ```
//!
//! Toyota Way: Jidoka - a design-level failure stops the sample immediately
//! instead of burning solver time on relaxations that cannot help.

use crate::config::RetryConfig;
use crate::ground_motion::GroundMotionRecord;
use crate::sample::ParameterSet;
use crate::solver::{SkipReason, Solver, SolverOutcome};
use crate::workspace::ArtifactWorkspace;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One solver invocation within a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunAttempt {
    /// Time step used.
    pub time_step: f64,
    /// Status the solver reported.
    pub status: i32,
    /// Fundamental period, if computed.
    pub fundamental_period: Option<f64>,
}

/// Final state of the ladder for a sample that was analysed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRun {
    attempts: Vec<RunAttempt>,
    /// Scale factor the solver applied.
    pub scale_factor: f64,
}

impl ResolvedRun {
    /// Attempts in ladder order; never empty.
    #[must_use]
    pub fn attempts(&self) -> &[RunAttempt] {
        &self.attempts
    }

    fn last(&self) -> &RunAttempt {
        // attempts is non-empty by construction in RetryPolicy::resolve
        &self.attempts[self.attempts.len() - 1]
    }

    /// Status of the last attempt.
    #[must_use]
    pub fn status(&self) -> i32 {
        self.last().status
    }

    /// Time step of the last attempt.
    #[must_use]
    pub fn time_step(&self) -> f64 {
        self.last().time_step
    }

    /// Fundamental period from the last attempt.
    #[must_use]
    pub fn fundamental_period(&self) -> Option<f64> {
        self.last().fundamental_period
    }

    /// Attempts beyond the first.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.attempts.len() - 1
    }
}

/// Terminal state of the retry policy for one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Solver ran; the last attempt's artifacts are on disk.
    Resolved(ResolvedRun),
    /// Sample dropped without a record.
    Skipped(SkipReason),
    /// Solver unusable; campaign should stop.
    Fatal(String),
}

/// Escalating time-step relaxation on numerical non-convergence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    time_steps: Vec<f64>,
    max_scale_factor: f64,
}

impl RetryPolicy {
    /// Create a policy from its config.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            time_steps: config.time_steps.clone(),
            max_scale_factor: config.max_scale_factor,
        }
    }

    /// Time steps tried in order.
    #[must_use]
    pub fn time_steps(&self) -> &[f64] {
        &self.time_steps
    }

    /// Whether a status should trigger the next rung.
    ///
    /// Only positive codes are unresolved; negative codes are an explicit,
    /// accepted failure classification.
    #[must_use]
    pub const fn should_retry(status: i32) -> bool {
        status > 0
    }

    /// Drive `solver` until the ladder resolves.
    pub fn resolve<S: Solver + ?Sized>(
        &self,
        solver: &S,
        workspace: &ArtifactWorkspace,
        params: &ParameterSet,
        ground_motion: &GroundMotionRecord,
    ) -> Resolution {
        if ground_motion.scale_factor > self.max_scale_factor {
            return Resolution::Skipped(SkipReason::ExcessiveScale {
                scale_factor: ground_motion.scale_factor,
                ceiling: self.max_scale_factor,
            });
        }

        let mut attempts = Vec::with_capacity(self.time_steps.len());
        let mut scale_factor = ground_motion.scale_factor;

        for (rung, &time_step) in self.time_steps.iter().enumerate() {
            if rung > 0 {
                info!(
                    gm = %ground_motion.filename,
                    time_step,
                    "analysis did not converge; retrying with smaller time step"
                );
            }
            match solver.invoke(workspace, params, ground_motion, time_step) {
                SolverOutcome::Ok(result) => {
                    debug!(time_step, status = result.status, "attempt finished");
                    scale_factor = result.scale_factor;
                    attempts.push(RunAttempt {
                        time_step,
                        status: result.status,
                        fundamental_period: result.fundamental_period,
                    });
                    if !Self::should_retry(result.status) {
                        break;
                    }
                }
                SolverOutcome::Skip(reason) => return Resolution::Skipped(reason),
                SolverOutcome::Fatal(reason) => return Resolution::Fatal(reason),
            }
        }

        if attempts.last().is_some_and(|a| Self::should_retry(a.status)) {
            warn!(
                gm = %ground_motion.filename,
                attempts = attempts.len(),
                "analysis still unconverged after exhausting time-step ladder"
            );
        }

        if attempts.is_empty() {
            return Resolution::Fatal("retry ladder has no time steps".into());
        }
        Resolution::Resolved(ResolvedRun {
            attempts,
            scale_factor,
        })
    }
}

//! Simulation campaign controller
//!
//! ```text
//! samples ──> matcher ──> retry policy ──> extractor ──> accumulator ──> stop?
//!   (i, p)      gm        (drives solver)    record        dataset
//! ```
//!
//! [`Campaign::run`] is strictly sequential over one workspace.
//! [`Campaign::run_parallel`] gives each worker its own workspace and funnels
//! results through a channel into a single accumulator.
//!
//! ## Example
//!
//! ```rust,no_run
//! use quake_campaign::campaign::Campaign;
//! use quake_campaign::config::CampaignConfig;
//! use quake_campaign::ground_motion::{GroundMotionTable, TableMatcher};
//! use quake_campaign::sample::load_samples_csv;
//! use quake_campaign::solver::ProcessSolver;
//! use std::sync::Arc;
//!
//! let config = CampaignConfig::from_json_file("campaign.json")?;
//! let table = GroundMotionTable::load_csv("groundMotions/gmList.csv")?;
//! let matcher = TableMatcher::new(table, config.ground_motion.clone())?;
//! let solver = ProcessSolver::new(&config.solver);
//!
//! let campaign = Campaign::new(config, Arc::new(solver), Arc::new(matcher));
//! let summary = campaign.run(load_samples_csv("inputs/samples.csv")?)?;
//! println!("{} usable of {} processed", summary.usable, summary.processed);
//! # Ok::<(), quake_campaign::Error>(())
//! ```

mod accumulator;
mod parallel;

pub use accumulator::{CampaignAccumulator, CampaignSummary, StopReason};

use crate::config::CampaignConfig;
use crate::extract::{Extractor, RunContext};
use crate::ground_motion::{ConsultedRecords, GroundMotionMatcher};
use crate::record::RunRecord;
use crate::retry::{Resolution, RetryPolicy};
use crate::sample::ParameterSet;
use crate::solver::{SkipReason, Solver};
use crate::workspace::ArtifactWorkspace;
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// What one sample produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Sample was analysed and extracted.
    Recorded(RunRecord),
    /// Sample was dropped without a record.
    Skipped(SkipReason),
}

impl SampleOutcome {
    /// Record to offer to the accumulator, logging skips.
    fn into_offer(self, index: usize) -> Option<RunRecord> {
        match self {
            Self::Recorded(record) => {
                info!(
                    index,
                    status = record.outcome().status,
                    usable = record.is_usable(),
                    "sample recorded"
                );
                Some(record)
            }
            Self::Skipped(reason) => {
                warn!(index, %reason, "sample skipped");
                None
            }
        }
    }
}

/// Campaign controller.
///
/// Cheap to clone: collaborators are shared.
#[derive(Clone)]
pub struct Campaign {
    config: CampaignConfig,
    solver: Arc<dyn Solver>,
    matcher: Arc<dyn GroundMotionMatcher>,
    policy: RetryPolicy,
    extractor: Extractor,
    consulted: Arc<ConsultedRecords>,
}

impl Campaign {
    /// Create a controller over the given collaborators.
    #[must_use]
    pub fn new(
        config: CampaignConfig,
        solver: Arc<dyn Solver>,
        matcher: Arc<dyn GroundMotionMatcher>,
    ) -> Self {
        Self {
            policy: RetryPolicy::new(&config.retry),
            extractor: Extractor::new(config.limits.clone()),
            consulted: Arc::new(ConsultedRecords::new()),
            config,
            solver,
            matcher,
        }
    }

    /// Campaign configuration.
    #[must_use]
    pub const fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Ground-motion records consulted so far.
    #[must_use]
    pub fn consulted(&self) -> &ConsultedRecords {
        &self.consulted
    }

    /// Resolve one sample end to end in `workspace`.
    ///
    /// # Errors
    ///
    /// Returns error only for campaign-level failures: the matcher cannot
    /// serve the sample, the solver is unusable, or a parameter shadows a
    /// derived field. Everything sample-level is a [`SampleOutcome::Skipped`].
    pub fn process_sample(
        &self,
        index: usize,
        params: &ParameterSet,
        workspace: &ArtifactWorkspace,
    ) -> Result<SampleOutcome> {
        info!(index, "starting sample");
        let ground_motion = self.matcher.select(index, params)?;
        self.consulted.note(&ground_motion);

        let run = match self
            .policy
            .resolve(self.solver.as_ref(), workspace, params, &ground_motion)
        {
            Resolution::Resolved(run) => run,
            Resolution::Skipped(reason) => return Ok(SampleOutcome::Skipped(reason)),
            Resolution::Fatal(reason) => return Err(Error::SolverFatal(reason)),
        };

        let context = RunContext {
            gm_file: ground_motion.filename.clone(),
            scale_factor: run.scale_factor,
            reference_intensity: ground_motion.reference_intensity,
            status: run.status(),
            fundamental_period: run.fundamental_period(),
            time_step: run.time_step(),
            retries: run.retries(),
        };

        match self.extractor.extract(workspace, &context, params) {
            Ok(record) => Ok(SampleOutcome::Recorded(record)),
            Err(e @ Error::FieldCollision(_)) => Err(e),
            Err(e) => Ok(SampleOutcome::Skipped(SkipReason::ExtractionAnomaly(
                e.to_string(),
            ))),
        }
    }

    /// Run the campaign sequentially over `samples`.
    ///
    /// The dataset and consulted-record table are written on every exit path;
    /// on error the original error is returned after that best-effort write.
    ///
    /// # Errors
    ///
    /// Returns error on a campaign-level failure (see [`Self::process_sample`])
    /// or if the final artifacts cannot be written
    pub fn run<I>(&self, samples: I) -> Result<CampaignSummary>
    where
        I: IntoIterator<Item = ParameterSet>,
    {
        let started_at = Utc::now();
        let workspace = ArtifactWorkspace::create(&self.config.paths.workspace)?;
        let mut acc = CampaignAccumulator::from_config(&self.config);
        let mut stop = StopReason::SourceExhausted;

        for (index, params) in samples.into_iter().enumerate() {
            let outcome = match self.process_sample(index, &params, &workspace) {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.abort(&acc, e)),
            };
            if !acc.offer(outcome.into_offer(index)) {
                stop = StopReason::TargetReached;
                break;
            }
        }

        acc.finalize(&self.config.paths, &self.consulted)?;
        let summary = acc.summary(stop, started_at);
        info!(?summary.stop, processed = summary.processed, usable = summary.usable, "campaign finished");
        Ok(summary)
    }

    /// Persist what we have, then hand back the error that stopped us.
    fn abort(&self, acc: &CampaignAccumulator, error: Error) -> Error {
        warn!(error = %error, "campaign aborted; writing partial dataset");
        if let Err(e) = acc.finalize(&self.config.paths, &self.consulted) {
            warn!(error = %e, "failed to write partial dataset");
        }
        error
    }
}

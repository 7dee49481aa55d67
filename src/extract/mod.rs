//! Run extractor
//!
//! Turns the last attempt's recorder output into scalar response metrics and
//! pass/fail flags. Extraction is a pure function of the artifacts on disk:
//! running it twice over the same directory yields the same record.
//!
//! ## Artifacts
//!
//! ```text
//! isolDisp.csv   time isol1..isolN isolLC     isolator-level displacement
//! isolVert.csv   time isol1..isolN isolLC     vertical displacement
//! isolRot.csv    time isol1..isolN isolLC     rotation
//! storyKDisp.csv time isol1..isolN isolLC     floor K displacement
//! isolJForce.csv time iAxial iShearX ... jMomentZ (12 components)
//! design.csv     variable,value
//! ```
//!
//! ## Flags
//!
//! - drift K: any sample on either tracked column (outer = 1, inner = 2)
//!   with |drift| > limit
//! - impacted: isolator displacement envelope >= moat gap at any sample
//! - uplifted: minimum |axial| across isolators <= threshold at any sample

mod design;
mod timeseries;

pub use design::{design_to_csv, load_design, DESIGN_FILE};
pub use timeseries::TimeSeriesTable;

use crate::config::ExtractionLimits;
use crate::record::{RunOutcome, RunRecord};
use crate::sample::ParameterSet;
use crate::workspace::ArtifactWorkspace;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Force recorder width: time plus 12 element force components.
pub const FORCE_COLUMNS: usize = 13;

/// Column of the i-node axial force in a force table.
const AXIAL_COLUMN: usize = 1;

/// Displacement columns used as the two drift reference points per story.
const DRIFT_REFERENCE_COLUMNS: [usize; 2] = [1, 2];

/// Isolator displacement artifact.
pub const ISOLATOR_DISPLACEMENT_FILE: &str = "isolDisp.csv";
/// Isolator vertical displacement artifact.
pub const ISOLATOR_VERTICAL_FILE: &str = "isolVert.csv";
/// Isolator rotation artifact.
pub const ISOLATOR_ROTATION_FILE: &str = "isolRot.csv";

/// Displacement artifact for story `story` (1-based).
#[must_use]
pub fn story_file(story: usize) -> String {
    format!("story{story}Disp.csv")
}

/// Force artifact for isolator `isolator` (1-based).
#[must_use]
pub fn force_file(isolator: usize) -> String {
    format!("isol{isolator}Force.csv")
}

/// Everything the solver reports about a resolved sample apart from its
/// artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Ground-motion record name.
    pub gm_file: String,
    /// Scale factor applied.
    pub scale_factor: f64,
    /// Reference spectral value of the record.
    pub reference_intensity: f64,
    /// Final solver status.
    pub status: i32,
    /// Fundamental period from the last attempt.
    pub fundamental_period: Option<f64>,
    /// Time step of the last attempt.
    pub time_step: f64,
    /// Retries taken.
    pub retries: usize,
}

/// Recorder tables of one run.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// Isolator-level displacement.
    pub isolator_displacement: TimeSeriesTable,
    /// Isolator vertical displacement.
    pub isolator_vertical: TimeSeriesTable,
    /// Isolator rotation.
    pub isolator_rotation: TimeSeriesTable,
    /// Floor displacement, story 1 upward.
    pub story_displacement: Vec<TimeSeriesTable>,
    /// Element forces, one table per isolator.
    pub isolator_forces: Vec<TimeSeriesTable>,
}

impl RunArtifacts {
    /// Load every recorder table from the workspace's output directory.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] for the first missing or malformed table
    pub fn load(workspace: &ArtifactWorkspace, limits: &ExtractionLimits) -> Result<Self> {
        // time, one column per isolator, leaning column
        let width = limits.isolators + 2;
        let load = |name: &str, width: usize| TimeSeriesTable::load(&workspace.output(name), width);

        Ok(Self {
            isolator_displacement: load(ISOLATOR_DISPLACEMENT_FILE, width)?,
            isolator_vertical: load(ISOLATOR_VERTICAL_FILE, width)?,
            isolator_rotation: load(ISOLATOR_ROTATION_FILE, width)?,
            story_displacement: (1..=limits.stories)
                .map(|s| load(&story_file(s), width))
                .collect::<Result<_>>()?,
            isolator_forces: (1..=limits.isolators)
                .map(|i| load(&force_file(i), FORCE_COLUMNS))
                .collect::<Result<_>>()?,
        })
    }
}

/// Response metrics computed from recorder tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    /// Largest absolute isolator displacement over all isolators and samples.
    pub max_displacement: f64,
    /// Peak absolute drift ratio per story.
    pub drift_max: Vec<f64>,
    /// Drift-limit exceedance per story.
    pub drift_exceeded: Vec<bool>,
    /// Displacement envelope reached the moat gap.
    pub impacted: bool,
    /// Axial compression dropped to the threshold.
    pub uplifted: bool,
}

/// Per-sample maximum of |value| across `columns` of `table`.
fn abs_envelope(table: &TimeSeriesTable, columns: std::ops::RangeInclusive<usize>) -> Vec<f64> {
    let mut envelope = vec![f64::NEG_INFINITY; table.len()];
    for col in columns {
        for (env, v) in envelope.iter_mut().zip(table.column(col)) {
            *env = env.max(v.abs());
        }
    }
    envelope
}

/// Inter-story drift ratios of `upper` relative to `lower` at `column`.
fn drift_series(upper: &TimeSeriesTable, lower: &TimeSeriesTable, column: usize, height: f64) -> Vec<f64> {
    upper
        .column(column)
        .iter()
        .zip(lower.column(column))
        .map(|(u, l)| (u - l) / height)
        .collect()
}

/// Run extractor configured with the model's thresholds.
#[derive(Debug, Clone)]
pub struct Extractor {
    limits: ExtractionLimits,
}

impl Extractor {
    /// Create an extractor.
    #[must_use]
    pub const fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn limits(&self) -> &ExtractionLimits {
        &self.limits
    }

    /// Compute response metrics against a moat gap.
    ///
    /// # Errors
    /// Returns error if the artifacts do not cover the configured model
    pub fn metrics(&self, artifacts: &RunArtifacts, moat_gap: f64) -> Result<ResponseMetrics> {
        let limits = &self.limits;
        if artifacts.story_displacement.len() != limits.stories {
            return Err(Error::InvalidInput(format!(
                "expected {} story tables, got {}",
                limits.stories,
                artifacts.story_displacement.len()
            )));
        }
        if artifacts.isolator_forces.len() != limits.isolators {
            return Err(Error::InvalidInput(format!(
                "expected {} force tables, got {}",
                limits.isolators,
                artifacts.isolator_forces.len()
            )));
        }

        let displacement = &artifacts.isolator_displacement;
        let envelope = abs_envelope(displacement, 1..=limits.isolators);
        let max_displacement = envelope.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_displacement.is_finite() {
            return Err(Error::InvalidInput(
                "isolator displacement has no finite samples".into(),
            ));
        }
        let impacted = envelope.iter().any(|&d| d >= moat_gap);

        let mut drift_max = Vec::with_capacity(limits.stories);
        let mut drift_exceeded = Vec::with_capacity(limits.stories);
        let mut lower = displacement;
        for upper in &artifacts.story_displacement {
            let mut peak = f64::NEG_INFINITY;
            let mut exceeded = false;
            for column in DRIFT_REFERENCE_COLUMNS {
                for drift in drift_series(upper, lower, column, limits.story_height) {
                    peak = peak.max(drift.abs());
                    exceeded |= drift.abs() > limits.drift_limit;
                }
            }
            if !peak.is_finite() {
                return Err(Error::InvalidInput("story drift has no finite samples".into()));
            }
            drift_max.push(peak);
            drift_exceeded.push(exceeded);
            lower = upper;
        }

        let samples = artifacts
            .isolator_forces
            .iter()
            .map(TimeSeriesTable::len)
            .min()
            .unwrap_or(0);
        let uplifted = (0..samples).any(|t| {
            let min_axial = artifacts
                .isolator_forces
                .iter()
                .map(|f| f.column(AXIAL_COLUMN).get(t).map_or(f64::INFINITY, |a| a.abs()))
                .fold(f64::INFINITY, f64::min);
            min_axial <= limits.uplift_threshold
        });

        Ok(ResponseMetrics {
            max_displacement,
            drift_max,
            drift_exceeded,
            impacted,
            uplifted,
        })
    }

    /// Extract the record for a resolved sample from the workspace.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] if an artifact is missing or malformed, or
    /// [`Error::FieldCollision`] if a parameter shadows a derived field
    pub fn extract(
        &self,
        workspace: &ArtifactWorkspace,
        run: &RunContext,
        params: &ParameterSet,
    ) -> Result<RunRecord> {
        let design = load_design(&workspace.output(DESIGN_FILE))?;
        let artifacts = RunArtifacts::load(workspace, &self.limits)?;
        let metrics = self
            .metrics(&artifacts, design.moat_gap)
            .map_err(|e| Error::extraction(workspace.output_dir(), e.to_string()))?;

        RunRecord::new(
            params.clone(),
            RunOutcome {
                gm_file: run.gm_file.clone(),
                gm_scale: run.scale_factor,
                gm_sa1: run.reference_intensity,
                fundamental_period: run.fundamental_period,
                time_step: run.time_step,
                retries: run.retries,
                design,
                max_displacement: metrics.max_displacement,
                drift_max: metrics.drift_max,
                drift_exceeded: metrics.drift_exceeded,
                impacted: metrics.impacted,
                uplifted: metrics.uplifted,
                status: run.status,
            },
        )
    }
}

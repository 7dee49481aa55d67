//! Campaign configuration
//!
//! Loaded from JSON (`serde_json`); every field has a default so a config
//! file only needs to name what differs from the reference campaign.
//!
//! ```rust
//! use quake_campaign::config::CampaignConfig;
//!
//! let config = CampaignConfig::builder()
//!     .target_usable(50)
//!     .checkpoint_every(5)
//!     .build()?;
//! assert_eq!(config.retry.time_steps, vec![0.005, 0.001, 0.0005]);
//! # Ok::<(), quake_campaign::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Nominal analysis time step followed by the two relaxations.
pub const DEFAULT_TIME_STEPS: [f64; 3] = [0.005, 0.001, 0.0005];

/// Ground-motion scale factor above which a sample is not analysed.
pub const DEFAULT_MAX_SCALE_FACTOR: f64 = 20.0;

/// Spectral acceleration at T = 1 s the record table was pre-scaled to.
pub const DEFAULT_DESIGN_INTENSITY: f64 = 1.017;

/// Top-level campaign configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Number of usable runs after which the campaign stops.
    pub target_usable: usize,
    /// Checkpoint the dataset every N processed samples.
    pub checkpoint_every: usize,
    /// Concurrent workers (1 = strictly sequential).
    pub workers: usize,
    /// Retry ladder and pre-attempt guard.
    pub retry: RetryConfig,
    /// Extraction thresholds and model geometry.
    pub limits: ExtractionLimits,
    /// Output and scratch locations.
    pub paths: PathConfig,
    /// Ground-motion scaling.
    pub ground_motion: GroundMotionConfig,
    /// External solver command.
    pub solver: SolverConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            target_usable: 100,
            checkpoint_every: 10,
            workers: 1,
            retry: RetryConfig::default(),
            limits: ExtractionLimits::default(),
            paths: PathConfig::default(),
            ground_motion: GroundMotionConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

/// Time-step ladder used by the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Time steps tried in order; one attempt per entry.
    pub time_steps: Vec<f64>,
    /// Samples whose scale factor exceeds this are skipped before any attempt.
    pub max_scale_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            time_steps: DEFAULT_TIME_STEPS.to_vec(),
            max_scale_factor: DEFAULT_MAX_SCALE_FACTOR,
        }
    }
}

/// Thresholds and geometry used by the run extractor.
///
/// Units follow the structural model: kip and inch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionLimits {
    /// Story height used to normalise inter-story drift (13 ft).
    pub story_height: f64,
    /// Drift ratio above which a story is flagged.
    pub drift_limit: f64,
    /// Minimum isolator compression; at or below this counts as uplift.
    pub uplift_threshold: f64,
    /// Number of superstructure stories recorded.
    pub stories: usize,
    /// Number of isolators recorded.
    pub isolators: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            story_height: 13.0 * 12.0,
            drift_limit: 0.05,
            uplift_threshold: 5.0,
            stories: 3,
            isolators: 4,
        }
    }
}

/// Filesystem layout for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Scratch root; holds `inputs/` and `outputs/` (or `worker-N/` roots).
    pub workspace: PathBuf,
    /// Final dataset (CSV).
    pub dataset: PathBuf,
    /// Optional Parquet copy of the final dataset.
    pub dataset_parquet: Option<PathBuf>,
    /// Periodic checkpoint of the in-progress dataset (CSV).
    pub checkpoint: PathBuf,
    /// Table of ground-motion records consulted during the campaign.
    pub ground_motions: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("scratch"),
            dataset: PathBuf::from("sessionOut/sessionSummary.csv"),
            dataset_parquet: None,
            checkpoint: PathBuf::from("sessionOut/checkpoint.csv"),
            ground_motions: PathBuf::from("sessionOut/gmList.csv"),
        }
    }
}

/// Ground-motion scaling inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundMotionConfig {
    /// Intensity the record table was pre-scaled to.
    pub design_intensity: f64,
    /// Parameters whose product is a sample's target intensity.
    pub intensity_params: Vec<String>,
}

impl Default for GroundMotionConfig {
    fn default() -> Self {
        Self {
            design_intensity: DEFAULT_DESIGN_INTENSITY,
            intensity_params: vec!["S1".to_string(), "S1Ampli".to_string()],
        }
    }
}

/// External solver command line.
///
/// `args` may contain the placeholders `{input}`, `{outputs}`, `{gm}`,
/// `{scale}` and `{dt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Program to execute.
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: ["eqAnly.py", "{input}", "{outputs}", "{gm}", "{scale}", "{dt}"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl CampaignConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> CampaignConfigBuilder {
        CampaignConfigBuilder::default()
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if self.target_usable == 0 {
            return Err(Error::Config("target_usable must be at least 1".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(Error::Config("checkpoint_every must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        let steps = &self.retry.time_steps;
        if steps.is_empty() {
            return Err(Error::Config("retry.time_steps must not be empty".into()));
        }
        if steps.iter().any(|dt| !dt.is_finite() || *dt <= 0.0) {
            return Err(Error::Config("retry.time_steps must be positive".into()));
        }
        if steps.windows(2).any(|w| w[1] >= w[0]) {
            return Err(Error::Config(
                "retry.time_steps must be strictly decreasing".into(),
            ));
        }
        if self.retry.max_scale_factor.is_nan() || self.retry.max_scale_factor <= 0.0 {
            return Err(Error::Config("retry.max_scale_factor must be positive".into()));
        }
        let limits = &self.limits;
        if limits.story_height <= 0.0 {
            return Err(Error::Config("limits.story_height must be positive".into()));
        }
        if limits.stories == 0 {
            return Err(Error::Config("limits.stories must be at least 1".into()));
        }
        // drift is tracked at isolator columns 1 and 2
        if limits.isolators < 2 {
            return Err(Error::Config("limits.isolators must be at least 2".into()));
        }
        if self.ground_motion.design_intensity <= 0.0 {
            return Err(Error::Config(
                "ground_motion.design_intensity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`CampaignConfig`]
#[derive(Debug, Default)]
pub struct CampaignConfigBuilder {
    config: CampaignConfig,
}

impl CampaignConfigBuilder {
    /// Set the usable-run target
    #[must_use]
    pub fn target_usable(mut self, target: usize) -> Self {
        self.config.target_usable = target;
        self
    }

    /// Set the checkpoint cadence
    #[must_use]
    pub fn checkpoint_every(mut self, every: usize) -> Self {
        self.config.checkpoint_every = every;
        self
    }

    /// Set the number of parallel workers
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Replace the time-step ladder
    #[must_use]
    pub fn time_steps(mut self, steps: Vec<f64>) -> Self {
        self.config.retry.time_steps = steps;
        self
    }

    /// Set the scale-factor ceiling
    #[must_use]
    pub fn max_scale_factor(mut self, ceiling: f64) -> Self {
        self.config.retry.max_scale_factor = ceiling;
        self
    }

    /// Replace the extraction limits
    #[must_use]
    pub fn limits(mut self, limits: ExtractionLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Root all campaign paths under `dir`
    #[must_use]
    pub fn root(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.config.paths = PathConfig {
            workspace: dir.join("scratch"),
            dataset: dir.join("sessionSummary.csv"),
            dataset_parquet: None,
            checkpoint: dir.join("checkpoint.csv"),
            ground_motions: dir.join("gmList.csv"),
        };
        self
    }

    /// Also write the final dataset as Parquet
    #[must_use]
    pub fn dataset_parquet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.dataset_parquet = Some(path.into());
        self
    }

    /// Set the external solver command
    #[must_use]
    pub fn solver(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.config.solver = SolverConfig {
            program: program.into(),
            args,
        };
        self
    }

    /// Validate and build the config
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails
    pub fn build(self) -> Result<CampaignConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CampaignConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.limits.story_height - 156.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CampaignConfig =
            serde_json::from_str(r#"{"target_usable": 7, "retry": {"max_scale_factor": 10.0}}"#)
                .unwrap();
        assert_eq!(config.target_usable, 7);
        assert!((config.retry.max_scale_factor - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.time_steps, DEFAULT_TIME_STEPS.to_vec());
        assert_eq!(config.limits.stories, 3);
    }

    #[test]
    fn test_rejects_non_decreasing_ladder() {
        let result = CampaignConfig::builder()
            .time_steps(vec![0.005, 0.005])
            .build();
        assert!(result.unwrap_err().to_string().contains("strictly decreasing"));
    }

    #[test]
    fn test_rejects_zero_target() {
        let result = CampaignConfig::builder().target_usable(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_single_isolator() {
        let mut config = CampaignConfig::default();
        config.limits.isolators = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("limits.isolators must be at least 2"));

        config.limits.isolators = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campaign.json");
        std::fs::write(&path, r#"{"checkpoint_every": 3, "workers": 2}"#).unwrap();

        let config = CampaignConfig::from_json_file(&path).unwrap();
        assert_eq!(config.checkpoint_every, 3);
        assert_eq!(config.workers, 2);
    }
}

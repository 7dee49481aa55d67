//! Campaign accumulator
//!
//! Single serialization point of a campaign: owns the dataset, the usable
//! counter and the checkpoint cadence, and decides when to stop. Once the
//! usable target is reached the accumulator closes and drops every later
//! offer, so the dataset never holds more than `target` usable rows even when
//! parallel workers finish after the target.

use crate::config::{CampaignConfig, PathConfig};
use crate::ground_motion::ConsultedRecords;
use crate::record::RunRecord;
use crate::storage::{write_ground_motions_csv, CampaignDataset};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Why a campaign stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Usable counter reached the configured target.
    TargetReached,
    /// Sample source ran out first.
    SourceExhausted,
}

/// Counters reported at the end of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSummary {
    /// Samples offered before the accumulator closed.
    pub processed: usize,
    /// Samples that produced no record.
    pub skipped: usize,
    /// Rows in the dataset.
    pub recorded: usize,
    /// Rows that count toward the target.
    pub usable: usize,
    /// Checkpoints successfully written.
    pub checkpoints: usize,
    /// Results that arrived after the accumulator closed.
    pub dropped: usize,
    /// Stop condition.
    pub stop: StopReason,
    /// Campaign start.
    pub started_at: DateTime<Utc>,
    /// Campaign end.
    pub finished_at: DateTime<Utc>,
}

/// Collects records, checkpoints, and applies the stopping criterion.
#[derive(Debug)]
pub struct CampaignAccumulator {
    dataset: CampaignDataset,
    target: usize,
    usable: usize,
    processed: usize,
    skipped: usize,
    dropped: usize,
    checkpoint_every: usize,
    checkpoint_path: Option<PathBuf>,
    checkpoints: usize,
    closed: bool,
}

impl CampaignAccumulator {
    /// Create an accumulator that does not checkpoint.
    #[must_use]
    pub fn new(target: usize, checkpoint_every: usize) -> Self {
        Self {
            dataset: CampaignDataset::new(),
            target,
            usable: 0,
            processed: 0,
            skipped: 0,
            dropped: 0,
            checkpoint_every: checkpoint_every.max(1),
            checkpoint_path: None,
            checkpoints: 0,
            closed: false,
        }
    }

    /// Create an accumulator from a campaign config, checkpointing to its
    /// checkpoint path.
    #[must_use]
    pub fn from_config(config: &CampaignConfig) -> Self {
        let mut acc = Self::new(config.target_usable, config.checkpoint_every);
        acc.checkpoint_path = Some(config.paths.checkpoint.clone());
        acc
    }

    /// Offer the result of one processed sample (`None` = skipped).
    ///
    /// Returns whether the campaign should continue.
    pub fn offer(&mut self, record: Option<RunRecord>) -> bool {
        if self.closed {
            self.dropped += 1;
            debug!("late result dropped; target already reached");
            return false;
        }

        self.processed += 1;
        match record {
            None => self.skipped += 1,
            Some(record) => {
                let usable = record.is_usable();
                match self.dataset.append(record) {
                    Ok(()) => {
                        if usable {
                            self.usable += 1;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "record rejected by dataset");
                        self.skipped += 1;
                    }
                }
            }
        }

        if self.processed % self.checkpoint_every == 0 {
            self.checkpoint();
        }

        if self.usable >= self.target {
            info!(usable = self.usable, target = self.target, "usable target reached");
            self.closed = true;
            return false;
        }
        true
    }

    /// Persist the in-progress dataset; failures are logged, never raised.
    fn checkpoint(&mut self) {
        let Some(path) = &self.checkpoint_path else {
            return;
        };
        match self.dataset.write_csv_atomic(path) {
            Ok(()) => {
                self.checkpoints += 1;
                debug!(rows = self.dataset.len(), path = %path.display(), "checkpoint written");
            }
            Err(e) => warn!(error = %e, path = %path.display(), "checkpoint failed; retrying next interval"),
        }
    }

    /// Whether the target has been reached.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Usable rows so far.
    #[must_use]
    pub const fn usable(&self) -> usize {
        self.usable
    }

    /// Samples processed so far.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.processed
    }

    /// Checkpoints taken so far.
    #[must_use]
    pub const fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    /// Accumulated dataset.
    #[must_use]
    pub const fn dataset(&self) -> &CampaignDataset {
        &self.dataset
    }

    /// Write the final dataset and the consulted ground-motion table.
    ///
    /// # Errors
    ///
    /// Returns error if a final artifact cannot be written
    pub fn finalize(&self, paths: &PathConfig, consulted: &ConsultedRecords) -> Result<()> {
        self.dataset.write_csv(&paths.dataset)?;
        if let Some(parquet) = &paths.dataset_parquet {
            self.dataset.write_parquet(parquet)?;
        }
        write_ground_motions_csv(&consulted.to_table(), &paths.ground_motions)?;
        info!(
            rows = self.dataset.len(),
            usable = self.usable,
            path = %paths.dataset.display(),
            "dataset written"
        );
        Ok(())
    }

    /// Final counters.
    #[must_use]
    pub fn summary(&self, stop: StopReason, started_at: DateTime<Utc>) -> CampaignSummary {
        CampaignSummary {
            processed: self.processed,
            skipped: self.skipped,
            recorded: self.dataset.len(),
            usable: self.usable,
            checkpoints: self.checkpoints,
            dropped: self.dropped,
            stop,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::outcome;
    use crate::sample::ParameterSet;

    fn record(status: i32) -> Option<RunRecord> {
        let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
        Some(RunRecord::new(params, outcome(status)).unwrap())
    }

    #[test]
    fn test_skips_do_not_count() {
        let mut acc = CampaignAccumulator::new(2, 100);
        assert!(acc.offer(None));
        assert!(acc.offer(record(0)));
        assert!(acc.offer(None));
        assert_eq!(acc.usable(), 1);
        assert_eq!(acc.dataset().len(), 1);
        assert_eq!(acc.processed(), 3);
    }

    #[test]
    fn test_unresolved_recorded_but_not_usable() {
        let mut acc = CampaignAccumulator::new(1, 100);
        assert!(acc.offer(record(2)));
        assert_eq!(acc.dataset().len(), 1);
        assert_eq!(acc.usable(), 0);
        assert!(!acc.offer(record(-1)));
        assert_eq!(acc.usable(), 1);
    }

    #[test]
    fn test_stops_at_target_and_drops_late_results() {
        let mut acc = CampaignAccumulator::new(2, 100);
        assert!(acc.offer(record(0)));
        assert!(!acc.offer(record(0)));
        assert!(acc.is_closed());
        assert!(!acc.offer(record(0)));
        assert!(!acc.offer(record(3)));

        let summary = acc.summary(StopReason::TargetReached, Utc::now());
        assert_eq!(summary.usable, 2);
        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.processed, 2);
    }

    #[test]
    fn test_checkpoint_cadence_counts_skips() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampaignConfig::builder()
            .root(dir.path())
            .target_usable(100)
            .checkpoint_every(3)
            .build()
            .unwrap();
        let mut acc = CampaignAccumulator::from_config(&config);

        for i in 0..7 {
            acc.offer(if i % 2 == 0 { None } else { record(0) });
        }
        assert_eq!(acc.checkpoints(), 2);
        let text = std::fs::read_to_string(&config.paths.checkpoint).unwrap();
        // header + rows recorded by sample 6 (indices 1, 3, 5)
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_checkpoint_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let mut config = CampaignConfig::default();
        config.checkpoint_every = 1;
        config.paths.checkpoint = blocker.join("checkpoint.csv");
        let mut acc = CampaignAccumulator::from_config(&config);

        assert!(acc.offer(record(0)));
        assert_eq!(acc.checkpoints(), 0);
        assert_eq!(acc.dataset().len(), 1);
    }

    #[test]
    fn test_finalize_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = CampaignConfig::builder().root(dir.path()).build().unwrap();
        let mut acc = CampaignAccumulator::from_config(&config);
        acc.offer(record(0));
        let consulted = ConsultedRecords::new();
        consulted.note(&crate::ground_motion::GroundMotionRecord {
            filename: "RSN125".into(),
            scale_factor: 3.0,
            reference_intensity: 1.017,
            table_scale_factor: 1.5,
        });

        acc.finalize(&config.paths, &consulted).unwrap();
        assert!(config.paths.dataset.exists());
        let gm = std::fs::read_to_string(&config.paths.ground_motions).unwrap();
        assert_eq!(gm.lines().next(), Some("filename,scaleFactorS1,scaledSa1"));
        assert_eq!(gm.lines().nth(1), Some("RSN125,1.5,1.017"));
    }
}

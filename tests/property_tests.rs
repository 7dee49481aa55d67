//! Property-based tests for quake-campaign
//!
//! Conventions:
//! - Test the controller's invariants, not single examples
//! - Run with ProptestConfig::with_cases(100)
//! - Must complete in <30 seconds for pre-commit hook

use proptest::prelude::*;
use quake_campaign::campaign::CampaignAccumulator;
use quake_campaign::config::{ExtractionLimits, RetryConfig, DEFAULT_TIME_STEPS};
use quake_campaign::extract::{Extractor, RunArtifacts, TimeSeriesTable, FORCE_COLUMNS};
use quake_campaign::ground_motion::GroundMotionRecord;
use quake_campaign::record::{DesignSummary, RunOutcome, RunRecord, StatusClass};
use quake_campaign::retry::{Resolution, RetryPolicy};
use quake_campaign::sample::ParameterSet;
use quake_campaign::solver::{AttemptResult, Solver, SolverOutcome};
use quake_campaign::workspace::ArtifactWorkspace;
use std::sync::Mutex;

// ============================================================================
// Helpers
// ============================================================================

/// Returns one scripted status per invocation, then keeps returning the last.
struct StatusScript {
    statuses: Vec<i32>,
    calls: Mutex<usize>,
}

impl Solver for StatusScript {
    fn run(&self, _: &ArtifactWorkspace, gm: &GroundMotionRecord, _: f64) -> SolverOutcome {
        let mut calls = self.calls.lock().unwrap();
        let status = self.statuses[(*calls).min(self.statuses.len() - 1)];
        *calls += 1;
        SolverOutcome::Ok(AttemptResult {
            status,
            fundamental_period: None,
            scale_factor: gm.scale_factor,
        })
    }
}

fn ground_motion(scale_factor: f64) -> GroundMotionRecord {
    GroundMotionRecord {
        filename: "RSN125".into(),
        scale_factor,
        reference_intensity: 1.017,
        table_scale_factor: scale_factor,
    }
}

fn record(status: i32) -> RunRecord {
    let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
    RunRecord::new(
        params,
        RunOutcome {
            gm_file: "RSN125".into(),
            gm_scale: 1.0,
            gm_sa1: 1.017,
            fundamental_period: None,
            time_step: 0.005,
            retries: 0,
            design: DesignSummary {
                mu: [0.01, 0.05, 0.1],
                radius: [16.0, 84.0, 84.0],
                moat_gap: 20.0,
                beam: "W24X62".into(),
                roof_beam: "W18X35".into(),
                col: "W14X82".into(),
            },
            max_displacement: 1.0,
            drift_max: vec![0.0],
            drift_exceeded: vec![false],
            impacted: false,
            uplifted: false,
            status,
        },
    )
    .unwrap()
}

fn limits() -> ExtractionLimits {
    ExtractionLimits {
        story_height: 100.0,
        drift_limit: 0.05,
        uplift_threshold: 5.0,
        stories: 1,
        isolators: 2,
    }
}

/// Artifacts for a 1-story, 2-isolator model from per-sample series.
fn artifacts(isol1: &[f64], isol2: &[f64], axial1: &[f64], axial2: &[f64]) -> RunArtifacts {
    let n = isol1.len();
    let time: Vec<f64> = (0..n).map(|t| t as f64 * 0.005).collect();
    let disp = TimeSeriesTable::from_columns(vec![
        time.clone(),
        isol1.to_vec(),
        isol2.to_vec(),
        vec![0.0; n],
    ])
    .unwrap();
    let force = |axial: &[f64]| {
        let mut columns = vec![vec![0.0; n]; FORCE_COLUMNS];
        columns[0] = time.clone();
        columns[1] = axial.to_vec();
        TimeSeriesTable::from_columns(columns).unwrap()
    };
    RunArtifacts {
        isolator_vertical: disp.clone(),
        isolator_rotation: disp.clone(),
        story_displacement: vec![disp.clone()],
        isolator_displacement: disp,
        isolator_forces: vec![force(axial1), force(axial2)],
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Sample result: `None` = skipped, otherwise a final status.
fn arb_offer() -> impl Strategy<Value = Option<i32>> {
    prop_oneof![Just(None), (-2i32..4).prop_map(Some)]
}

/// Two isolator series and two axial series of a common length.
fn arb_series() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    (1usize..30).prop_flat_map(|n| {
        (
            proptest::collection::vec(-30.0f64..30.0, n),
            proptest::collection::vec(-30.0f64..30.0, n),
            proptest::collection::vec(-100.0f64..10.0, n),
            proptest::collection::vec(-100.0f64..10.0, n),
        )
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Retry Ladder Properties
    // ========================================================================

    /// Property: attempts walk the ladder in order and stop at the first
    /// status that does not warrant a retry
    #[test]
    fn prop_ladder_monotonic(statuses in proptest::collection::vec(-2i32..3, 1..4)) {
        let dir = tempfile::tempdir().unwrap();
        let ws = ArtifactWorkspace::create(dir.path()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
        let solver = StatusScript { statuses: statuses.clone(), calls: Mutex::new(0) };
        let policy = RetryPolicy::new(&RetryConfig::default());

        let Resolution::Resolved(run) = policy.resolve(&solver, &ws, &params, &ground_motion(2.0)) else {
            return Err(TestCaseError::fail("scripted solver always resolves"));
        };

        prop_assert!(run.attempts().len() <= DEFAULT_TIME_STEPS.len());
        for (attempt, expected) in run.attempts().iter().zip(DEFAULT_TIME_STEPS) {
            prop_assert!((attempt.time_step - expected).abs() < f64::EPSILON);
        }
        for pair in run.attempts().windows(2) {
            prop_assert!(pair[1].time_step < pair[0].time_step);
            prop_assert!(pair[0].status > 0);
        }
        let exhausted = run.attempts().len() == DEFAULT_TIME_STEPS.len();
        prop_assert!(run.status() <= 0 || exhausted);
        prop_assert_eq!(run.retries(), run.attempts().len() - 1);
    }

    /// Property: no attempt is made above the scale-factor ceiling
    #[test]
    fn prop_scale_guard(scale in 0.1f64..40.0) {
        let dir = tempfile::tempdir().unwrap();
        let ws = ArtifactWorkspace::create(dir.path()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
        let solver = StatusScript { statuses: vec![0], calls: Mutex::new(0) };
        let policy = RetryPolicy::new(&RetryConfig::default());

        let resolution = policy.resolve(&solver, &ws, &params, &ground_motion(scale));
        let calls = *solver.calls.lock().unwrap();
        if scale > 20.0 {
            prop_assert!(matches!(resolution, Resolution::Skipped(_)));
            prop_assert_eq!(calls, 0);
        } else {
            prop_assert!(matches!(resolution, Resolution::Resolved(_)));
            prop_assert_eq!(calls, 1);
        }
    }

    // ========================================================================
    // Accumulator Properties
    // ========================================================================

    /// Property: the usable count never exceeds the target and a closed
    /// accumulator accepts nothing
    #[test]
    fn prop_accumulator_cap(
        offers in proptest::collection::vec(arb_offer(), 0..60),
        target in 1usize..10
    ) {
        let mut acc = CampaignAccumulator::new(target, 5);
        for offer in offers {
            let was_closed = acc.is_closed();
            let rows_before = acc.dataset().len();
            let keep_going = acc.offer(offer.map(record));

            prop_assert!(acc.usable() <= target);
            prop_assert_eq!(acc.dataset().usable_count(), acc.usable());
            prop_assert_eq!(keep_going, acc.usable() < target);
            if was_closed {
                prop_assert!(!keep_going);
                prop_assert_eq!(acc.dataset().len(), rows_before);
            }
        }
    }

    /// Property: usable iff converged or accepted failure
    #[test]
    fn prop_status_usable(status in -100i32..100) {
        prop_assert_eq!(StatusClass::of(status).is_usable(), status <= 0);
    }

    // ========================================================================
    // Extraction Properties
    // ========================================================================

    /// Property: impact iff the envelope reaches the gap (closed interval)
    #[test]
    fn prop_impact_threshold(
        (isol1, isol2, axial1, axial2) in arb_series(),
        gap in 0.0f64..35.0
    ) {
        let extractor = Extractor::new(limits());
        let m = extractor.metrics(&artifacts(&isol1, &isol2, &axial1, &axial2), gap).unwrap();

        let peak = isol1.iter().chain(&isol2).map(|v| v.abs()).fold(0.0, f64::max);
        prop_assert!((m.max_displacement - peak).abs() < 1e-12);
        prop_assert_eq!(m.impacted, peak >= gap);

        // exactly at the peak is an impact
        let at_peak = extractor.metrics(&artifacts(&isol1, &isol2, &axial1, &axial2), peak).unwrap();
        prop_assert!(at_peak.impacted);
    }

    /// Property: uplift iff at some instant the least-compressed isolator is
    /// within the threshold
    #[test]
    fn prop_uplift_threshold((isol1, isol2, axial1, axial2) in arb_series()) {
        let extractor = Extractor::new(limits());
        let m = extractor.metrics(&artifacts(&isol1, &isol2, &axial1, &axial2), 100.0).unwrap();

        let expected = axial1
            .iter()
            .zip(&axial2)
            .any(|(a, b)| a.abs().min(b.abs()) <= 5.0);
        prop_assert_eq!(m.uplifted, expected);
    }

    /// Property: extraction is a pure function of its input
    #[test]
    fn prop_metrics_idempotent((isol1, isol2, axial1, axial2) in arb_series()) {
        let extractor = Extractor::new(limits());
        let run = artifacts(&isol1, &isol2, &axial1, &axial2);
        prop_assert_eq!(extractor.metrics(&run, 10.0).unwrap(), extractor.metrics(&run, 10.0).unwrap());
    }
}

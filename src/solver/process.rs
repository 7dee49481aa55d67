//! Subprocess-backed solver

use super::{AttemptResult, SkipReason, Solver, SolverOutcome};
use crate::config::SolverConfig;
use crate::ground_motion::GroundMotionRecord;
use crate::workspace::ArtifactWorkspace;
use std::process::Command;
use tracing::debug;

/// Status file the solver writes on exit 0: `<status> <fundamentalPeriod>`.
pub const STATUS_FILE: &str = "runStatus.txt";

/// Exit code: bearing design returned negative friction coefficients.
pub const EXIT_NEGATIVE_FRICTION: i32 = 10;
/// Exit code: bearing design returned complex friction coefficients.
pub const EXIT_COMPLEX_FRICTION: i32 = 11;
/// Exit code: superstructure design found no feasible section.
pub const EXIT_DESIGN_INFEASIBLE: i32 = 12;

/// Runs the analysis as an external program.
///
/// Arguments are expanded from a template; see [`SolverConfig`].
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: String,
    args: Vec<String>,
}

impl ProcessSolver {
    /// Create a solver from its command template.
    #[must_use]
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn expand(&self, ws: &ArtifactWorkspace, gm: &GroundMotionRecord, time_step: f64) -> Vec<String> {
        let input = ws.input_path().display().to_string();
        let outputs = ws.output_dir().display().to_string();
        let scale = gm.scale_factor.to_string();
        let dt = time_step.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{outputs}", &outputs)
                    .replace("{gm}", &gm.filename)
                    .replace("{scale}", &scale)
                    .replace("{dt}", &dt)
            })
            .collect()
    }

    fn read_status(ws: &ArtifactWorkspace, scale_factor: f64) -> SolverOutcome {
        let path = ws.output(STATUS_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => return SolverOutcome::Fatal(format!("{}: {e}", path.display())),
        };
        let mut fields = text.split_whitespace();
        let Some(status) = fields.next().and_then(|s| s.parse::<i32>().ok()) else {
            return SolverOutcome::Fatal(format!("{}: no integer status", path.display()));
        };
        let fundamental_period = fields
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|t| t.is_finite());
        SolverOutcome::Ok(AttemptResult {
            status,
            fundamental_period,
            scale_factor,
        })
    }
}

impl Solver for ProcessSolver {
    fn run(&self, ws: &ArtifactWorkspace, gm: &GroundMotionRecord, time_step: f64) -> SolverOutcome {
        let args = self.expand(ws, gm, time_step);
        debug!(program = %self.program, ?args, "launching solver");

        let output = match Command::new(&self.program)
            .args(&args)
            .current_dir(ws.root())
            .output()
        {
            Ok(output) => output,
            Err(e) => return SolverOutcome::Fatal(format!("failed to launch {}: {e}", self.program)),
        };

        match output.status.code() {
            Some(0) => Self::read_status(ws, gm.scale_factor),
            Some(EXIT_NEGATIVE_FRICTION) => SolverOutcome::Skip(SkipReason::NegativeFriction),
            Some(EXIT_COMPLEX_FRICTION) => SolverOutcome::Skip(SkipReason::ComplexFriction),
            Some(EXIT_DESIGN_INFEASIBLE) => SolverOutcome::Skip(SkipReason::DesignInfeasible),
            code => SolverOutcome::Fatal(format!(
                "{} exited with {code:?}: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sample::ParameterSet;

    fn shell(script: &str) -> ProcessSolver {
        ProcessSolver::new(&SolverConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "solver".into(), "{outputs}".into(), "{dt}".into()],
        })
    }

    fn setup() -> (tempfile::TempDir, ArtifactWorkspace, ParameterSet, GroundMotionRecord) {
        let dir = tempfile::tempdir().unwrap();
        let ws = ArtifactWorkspace::create(dir.path()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
        let gm = GroundMotionRecord {
            filename: "RSN1".into(),
            scale_factor: 2.0,
            reference_intensity: 1.0,
            table_scale_factor: 2.0,
        };
        (dir, ws, params, gm)
    }

    #[test]
    fn test_status_file_is_read_on_success() {
        let (_dir, ws, params, gm) = setup();
        let solver = shell(r#"echo "0 3.25" > "$1/runStatus.txt""#);

        let outcome = solver.invoke(&ws, &params, &gm, 0.005);
        assert_eq!(
            outcome,
            SolverOutcome::Ok(AttemptResult {
                status: 0,
                fundamental_period: Some(3.25),
                scale_factor: 2.0,
            })
        );
    }

    #[test]
    fn test_time_step_is_passed_through() {
        let (_dir, ws, params, gm) = setup();
        let solver = shell(r#"echo "$2 nan" > "$1/dt.txt"; echo "-1 nan" > "$1/runStatus.txt""#);

        let outcome = solver.invoke(&ws, &params, &gm, 0.001);
        let SolverOutcome::Ok(result) = outcome else {
            panic!("expected Ok, got {outcome:?}");
        };
        assert_eq!(result.status, -1);
        assert!(result.fundamental_period.is_none());
        let recorded = std::fs::read_to_string(ws.output("dt.txt")).unwrap();
        assert!(recorded.starts_with("0.001"));
    }

    #[test]
    fn test_relative_workspace_paths_resolve_in_solver_dir() {
        let relative = std::path::PathBuf::from("target").join(format!("solver-relative-{}", std::process::id()));
        let ws = ArtifactWorkspace::create(&relative).unwrap();
        let (_dir, _, params, gm) = setup();
        let solver = ProcessSolver::new(&SolverConfig {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"test -f "$2" || exit 3; echo "0 2.5" > "$1/runStatus.txt""#.into(),
                "solver".into(),
                "{outputs}".into(),
                "{input}".into(),
            ],
        });

        let outcome = solver.invoke(&ws, &params, &gm, 0.005);
        std::fs::remove_dir_all(&relative).unwrap();
        assert!(matches!(outcome, SolverOutcome::Ok(AttemptResult { status: 0, .. })), "{outcome:?}");
    }

    #[test]
    fn test_exit_codes_map_to_skips() {
        let (_dir, ws, params, gm) = setup();
        assert_eq!(
            shell("exit 10").invoke(&ws, &params, &gm, 0.005),
            SolverOutcome::Skip(SkipReason::NegativeFriction)
        );
        assert_eq!(
            shell("exit 11").invoke(&ws, &params, &gm, 0.005),
            SolverOutcome::Skip(SkipReason::ComplexFriction)
        );
        assert_eq!(
            shell("exit 12").invoke(&ws, &params, &gm, 0.005),
            SolverOutcome::Skip(SkipReason::DesignInfeasible)
        );
    }

    #[test]
    fn test_unknown_exit_and_missing_status_are_fatal() {
        let (_dir, ws, params, gm) = setup();
        assert!(matches!(
            shell("exit 3").invoke(&ws, &params, &gm, 0.005),
            SolverOutcome::Fatal(_)
        ));
        assert!(matches!(
            shell("true").invoke(&ws, &params, &gm, 0.005),
            SolverOutcome::Fatal(_)
        ));
    }
}

//! Run Record - one labelled dataset row per analysed sample
//!
//! A record is the union of the sample's parameters and the derived outcome
//! fields. The two namespaces must stay disjoint; [`RunRecord::new`] refuses
//! a parameter set that would shadow a derived column.

use crate::sample::ParameterSet;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fixed derived columns that precede the per-story drift columns.
pub const LEADING_FIELDS: [&str; 16] = [
    "GMFile",
    "GMScale",
    "GMSa1",
    "fundamentalPeriod",
    "timeStep",
    "retries",
    "mu1",
    "mu2",
    "mu3",
    "R1",
    "R2",
    "R3",
    "moatGap",
    "beam",
    "roofBeam",
    "col",
];

/// Fixed derived columns that follow the per-story drift columns.
pub const TRAILING_FIELDS: [&str; 3] = ["impacted", "uplifted", "runFailed"];

/// Derived column names for a model with `stories` stories, in dataset order.
#[must_use]
pub fn derived_field_names(stories: usize) -> Vec<String> {
    let mut names: Vec<String> = LEADING_FIELDS.iter().map(ToString::to_string).collect();
    names.push("maxDisplacement".to_string());
    names.extend((1..=stories).map(|s| format!("driftMax{s}")));
    names.extend((1..=stories).map(|s| format!("drift{s}")));
    names.extend(TRAILING_FIELDS.iter().map(ToString::to_string));
    names
}

/// Whether `name` can never be used as a parameter name.
#[must_use]
pub fn is_derived_name(name: &str) -> bool {
    if LEADING_FIELDS.contains(&name) || TRAILING_FIELDS.contains(&name) || name == "maxDisplacement" {
        return true;
    }
    ["driftMax", "drift"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Classification of a final solver status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusClass {
    /// Status 0.
    Converged,
    /// Negative sentinel: an explicitly accepted failure outcome.
    AcceptedFailure,
    /// Positive: non-convergence left unresolved by the retry ladder.
    Unresolved,
}

impl StatusClass {
    /// Classify a status code.
    #[must_use]
    pub const fn of(status: i32) -> Self {
        if status == 0 {
            Self::Converged
        } else if status < 0 {
            Self::AcceptedFailure
        } else {
            Self::Unresolved
        }
    }

    /// Whether the outcome counts toward the campaign target.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Converged | Self::AcceptedFailure)
    }
}

/// Superstructure and bearing design selected for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSummary {
    /// Friction coefficients of the three sliding surfaces.
    pub mu: [f64; 3],
    /// Effective radii of the three sliding surfaces.
    pub radius: [f64; 3],
    /// Clearance to the moat wall.
    pub moat_gap: f64,
    /// Floor beam section label.
    pub beam: String,
    /// Roof beam section label.
    pub roof_beam: String,
    /// Column section label.
    pub col: String,
}

/// Typed value of a dataset cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Numeric, possibly missing.
    Float(Option<f64>),
    /// Integer (flags, counts, status).
    Int(i64),
    /// Label.
    Text(String),
}

/// Derived outcome of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Ground-motion record name.
    pub gm_file: String,
    /// Scale factor applied to the record.
    pub gm_scale: f64,
    /// Reference spectral value of the record.
    pub gm_sa1: f64,
    /// Fundamental period from the last attempt.
    pub fundamental_period: Option<f64>,
    /// Time step of the last attempt.
    pub time_step: f64,
    /// Number of retries taken.
    pub retries: usize,
    /// Design used by the model.
    pub design: DesignSummary,
    /// Largest absolute isolator displacement.
    pub max_displacement: f64,
    /// Peak absolute drift ratio per story.
    pub drift_max: Vec<f64>,
    /// Drift-limit exceedance per story.
    pub drift_exceeded: Vec<bool>,
    /// Isolator reached the moat wall.
    pub impacted: bool,
    /// Isolator lost compression.
    pub uplifted: bool,
    /// Final solver status code.
    pub status: i32,
}

impl RunOutcome {
    /// Status classification.
    #[must_use]
    pub const fn status_class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }
}

/// Dataset row: parameters merged with the derived outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    parameters: ParameterSet,
    outcome: RunOutcome,
}

impl RunRecord {
    /// Merge parameters with an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldCollision`] if a parameter name is a derived name,
    /// or [`Error::InvalidInput`] if the per-story vectors disagree in length
    pub fn new(parameters: ParameterSet, outcome: RunOutcome) -> Result<Self> {
        if let Some(name) = parameters.names().find(|name| is_derived_name(name)) {
            return Err(Error::FieldCollision(name.to_string()));
        }
        if outcome.drift_max.len() != outcome.drift_exceeded.len() {
            return Err(Error::InvalidInput(format!(
                "{} drift maxima but {} drift flags",
                outcome.drift_max.len(),
                outcome.drift_exceeded.len()
            )));
        }
        Ok(Self { parameters, outcome })
    }

    /// Sample parameters.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Derived outcome.
    #[must_use]
    pub const fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Number of stories the record covers.
    #[must_use]
    pub fn stories(&self) -> usize {
        self.outcome.drift_max.len()
    }

    /// Whether this record counts toward the campaign target.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.outcome.status_class().is_usable()
    }

    /// Derived fields as `(name, value)` in dataset order.
    #[must_use]
    pub fn derived_fields(&self) -> Vec<(String, FieldValue)> {
        let o = &self.outcome;
        let d = &o.design;
        let flag = |b: bool| FieldValue::Int(i64::from(b));
        let mut values = vec![
            FieldValue::Text(o.gm_file.clone()),
            FieldValue::Float(Some(o.gm_scale)),
            FieldValue::Float(Some(o.gm_sa1)),
            FieldValue::Float(o.fundamental_period),
            FieldValue::Float(Some(o.time_step)),
            FieldValue::Int(i64::try_from(o.retries).unwrap_or(i64::MAX)),
            FieldValue::Float(Some(d.mu[0])),
            FieldValue::Float(Some(d.mu[1])),
            FieldValue::Float(Some(d.mu[2])),
            FieldValue::Float(Some(d.radius[0])),
            FieldValue::Float(Some(d.radius[1])),
            FieldValue::Float(Some(d.radius[2])),
            FieldValue::Float(Some(d.moat_gap)),
            FieldValue::Text(d.beam.clone()),
            FieldValue::Text(d.roof_beam.clone()),
            FieldValue::Text(d.col.clone()),
            FieldValue::Float(Some(o.max_displacement)),
        ];
        values.extend(o.drift_max.iter().map(|&v| FieldValue::Float(Some(v))));
        values.extend(o.drift_exceeded.iter().map(|&b| flag(b)));
        values.push(flag(o.impacted));
        values.push(flag(o.uplifted));
        values.push(FieldValue::Int(i64::from(o.status)));

        derived_field_names(self.stories())
            .into_iter()
            .zip(values)
            .collect()
    }
}

//! Parameter samples
//!
//! A [`ParameterSet`] is one row of the design-of-experiments table: an
//! ordered list of named numeric values. The sampler itself lives outside
//! this crate; campaigns consume any iterator of parameter sets, and
//! [`load_samples_csv`] reads the table the sampler writes.

use crate::{Error, Result};
use arrow::array::{Array, Float64Array};
use arrow::compute::kernels::cast::{cast_with_options, CastOptions};
use arrow::csv::reader::Format;
use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

/// Ordered mapping of parameter name to value for one sample.
///
/// Immutable after construction; names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    entries: Vec<(String, f64)>,
}

impl ParameterSet {
    /// Build a parameter set from `(name, value)` pairs, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on an empty or duplicated name
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut entries: Vec<(String, f64)> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::InvalidInput("empty parameter name".into()));
            }
            if entries.iter().any(|(existing, _)| *existing == name) {
                return Err(Error::InvalidInput(format!(
                    "duplicate parameter name '{name}'"
                )));
            }
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    /// Value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    /// Parameter names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as the solver's `variable,value` input table.
    #[must_use]
    pub fn to_input_csv(&self) -> String {
        let mut out = String::from("variable,value\n");
        for (name, value) in &self.entries {
            out.push_str(name);
            out.push(',');
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }
}

/// Load a headered sample table: one column per parameter, one row per sample.
///
/// # Errors
///
/// Returns error if the file cannot be read or a cell is not numeric
pub fn load_samples_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ParameterSet>> {
    let mut file = File::open(path.as_ref()).map_err(|e| {
        Error::StorageError(format!(
            "Failed to open sample table {}: {e}",
            path.as_ref().display()
        ))
    })?;

    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    file.rewind()?;

    let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let reader = arrow::csv::ReaderBuilder::new(Arc::new(schema))
        .with_format(format)
        .build(file)?;

    let strict = CastOptions {
        safe: false,
        ..CastOptions::default()
    };

    let mut samples = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (idx, column) in batch.columns().iter().enumerate() {
            let cast = cast_with_options(column, &DataType::Float64, &strict).map_err(|e| {
                Error::InvalidInput(format!("parameter column '{}': {e}", names[idx]))
            })?;
            columns.push(cast);
        }

        for row in 0..batch.num_rows() {
            let mut pairs = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                let values = column
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| Error::InvalidInput("parameter column is not Float64".into()))?;
                if values.is_null(row) {
                    return Err(Error::InvalidInput(format!(
                        "sample {} has no value for '{}'",
                        samples.len(),
                        names[idx]
                    )));
                }
                pairs.push((names[idx].clone(), values.value(row)));
            }
            samples.push(ParameterSet::from_pairs(pairs)?);
        }
    }

    Ok(samples)
}

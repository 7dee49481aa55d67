//! Ground-motion records
//!
//! The record table is produced by an external selection/scaling utility
//! (PEER NGA search results, pre-scaled to the design spectrum). This module
//! loads that table, picks a record per sample, and keeps track of every
//! record consulted so the campaign can be reproduced.

use crate::config::GroundMotionConfig;
use crate::sample::ParameterSet;
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::kernels::cast::{cast_with_options, CastOptions};
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Seek;
use std::path::Path;
use std::sync::Arc;

/// Column holding the record file name.
pub const FILENAME_COLUMN: &str = "filename";
/// Column holding the tabulated scale factor.
pub const SCALE_COLUMN: &str = "scaleFactorS1";
/// Column holding the scaled spectral acceleration at T = 1 s.
pub const INTENSITY_COLUMN: &str = "scaledSa1";

/// One row of the record table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundMotionEntry {
    /// Record name without the `.AT2` extension.
    pub filename: String,
    /// Factor that scales the raw record to the design spectrum.
    pub scale_factor: f64,
    /// Spectral value of the scaled record.
    pub reference_intensity: f64,
}

/// Record chosen for one sample, immutable for the sample's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundMotionRecord {
    /// Record name without extension.
    pub filename: String,
    /// Scale factor applied in the analysis.
    pub scale_factor: f64,
    /// Reference spectral value of the tabulated record.
    pub reference_intensity: f64,
    /// Tabulated (design-spectrum) scale factor.
    pub table_scale_factor: f64,
}

impl GroundMotionRecord {
    /// Table row this record was derived from.
    #[must_use]
    pub fn entry(&self) -> GroundMotionEntry {
        GroundMotionEntry {
            filename: self.filename.clone(),
            scale_factor: self.table_scale_factor,
            reference_intensity: self.reference_intensity,
        }
    }
}

/// Candidate record table.
#[derive(Debug, Clone, Default)]
pub struct GroundMotionTable {
    entries: Vec<GroundMotionEntry>,
    index: FxHashMap<String, usize>,
}

impl GroundMotionTable {
    /// Build a table from entries; later duplicates of a filename are ignored.
    #[must_use]
    pub fn new(entries: Vec<GroundMotionEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            if table.index.contains_key(&entry.filename) {
                continue;
            }
            table.index.insert(entry.filename.clone(), table.entries.len());
            table.entries.push(entry);
        }
        table
    }

    /// Load the record table written by the selection utility.
    ///
    /// Extra columns are ignored; the `.AT2` extension is stripped.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or a required column is missing
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref()).map_err(|e| {
            Error::StorageError(format!(
                "Failed to open ground-motion table {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let format = Format::default().with_header(true);
        let (schema, _) = format.infer_schema(&mut file, None)?;
        file.rewind()?;

        let position = |name: &str| {
            schema
                .index_of(name)
                .map_err(|_| Error::InvalidInput(format!("ground-motion table lacks '{name}'")))
        };
        let name_idx = position(FILENAME_COLUMN)?;
        let scale_idx = position(SCALE_COLUMN)?;
        let sa_idx = position(INTENSITY_COLUMN)?;

        let reader = arrow::csv::ReaderBuilder::new(Arc::new(schema))
            .with_format(format)
            .build(file)?;

        let mut entries = Vec::new();
        for batch in reader {
            let batch = batch?;
            let names = cast_with_options(batch.column(name_idx), &DataType::Utf8, &strict())?;
            let names = names
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::InvalidInput("filename column is not text".into()))?;
            let scales = float_column(batch.column(scale_idx), SCALE_COLUMN)?;
            let intensities = float_column(batch.column(sa_idx), INTENSITY_COLUMN)?;

            for row in 0..batch.num_rows() {
                if names.is_null(row) || scales.is_null(row) || intensities.is_null(row) {
                    return Err(Error::InvalidInput(format!(
                        "ground-motion table row {} is incomplete",
                        entries.len()
                    )));
                }
                entries.push(GroundMotionEntry {
                    filename: names.value(row).trim_end_matches(".AT2").to_string(),
                    scale_factor: scales.value(row),
                    reference_intensity: intensities.value(row),
                });
            }
        }

        Ok(Self::new(entries))
    }

    /// Look up a record by filename.
    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&GroundMotionEntry> {
        self.index.get(filename).map(|&idx| &self.entries[idx])
    }

    /// All entries in table order.
    #[must_use]
    pub fn entries(&self) -> &[GroundMotionEntry] {
        &self.entries
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arrow representation with the selection utility's column names.
    ///
    /// # Errors
    /// Returns error if the batch cannot be assembled
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        entries_to_batch(&self.entries)
    }
}

fn strict() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..CastOptions::default()
    }
}

fn float_column(column: &ArrayRef, name: &str) -> Result<Float64Array> {
    let cast = cast_with_options(column, &DataType::Float64, &strict())
        .map_err(|e| Error::InvalidInput(format!("column '{name}': {e}")))?;
    cast.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| Error::InvalidInput(format!("column '{name}' is not numeric")))
}

fn entries_to_batch(entries: &[GroundMotionEntry]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(FILENAME_COLUMN, DataType::Utf8, false),
        Field::new(SCALE_COLUMN, DataType::Float64, false),
        Field::new(INTENSITY_COLUMN, DataType::Float64, false),
    ]));
    let names = StringArray::from_iter_values(entries.iter().map(|e| e.filename.as_str()));
    let scales = Float64Array::from_iter_values(entries.iter().map(|e| e.scale_factor));
    let sa = Float64Array::from_iter_values(entries.iter().map(|e| e.reference_intensity));
    Ok(RecordBatch::try_new(
        schema,
        vec![Arc::new(names), Arc::new(scales), Arc::new(sa)],
    )?)
}

/// Chooses the ground motion for a sample.
pub trait GroundMotionMatcher: Send + Sync {
    /// Select a record and the scale factor to apply for `params`.
    ///
    /// # Errors
    /// Returns error if the sample lacks what the matcher needs
    fn select(&self, sample_index: usize, params: &ParameterSet) -> Result<GroundMotionRecord>;
}

/// Round-robin matcher over a pre-scaled record table.
///
/// Record `sample_index mod len` is rescaled from the design intensity to the
/// sample's target intensity (the product of the configured parameters).
#[derive(Debug, Clone)]
pub struct TableMatcher {
    table: GroundMotionTable,
    config: GroundMotionConfig,
}

impl TableMatcher {
    /// Create a matcher over `table`.
    ///
    /// # Errors
    /// Returns error if the table is empty
    pub fn new(table: GroundMotionTable, config: GroundMotionConfig) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::InvalidInput("ground-motion table is empty".into()));
        }
        Ok(Self { table, config })
    }

    /// Target spectral intensity of a sample.
    ///
    /// # Errors
    /// Returns error if an intensity parameter is missing
    pub fn target_intensity(&self, params: &ParameterSet) -> Result<f64> {
        self.config
            .intensity_params
            .iter()
            .try_fold(1.0, |acc, name| {
                params.get(name).map(|v| acc * v).ok_or_else(|| {
                    Error::InvalidInput(format!("sample lacks intensity parameter '{name}'"))
                })
            })
    }
}

impl GroundMotionMatcher for TableMatcher {
    fn select(&self, sample_index: usize, params: &ParameterSet) -> Result<GroundMotionRecord> {
        let target = self.target_intensity(params)?;
        let entry = &self.table.entries()[sample_index % self.table.len()];
        Ok(GroundMotionRecord {
            filename: entry.filename.clone(),
            scale_factor: entry.scale_factor * target / self.config.design_intensity,
            reference_intensity: entry.reference_intensity,
            table_scale_factor: entry.scale_factor,
        })
    }
}

/// Registry of records consulted during a campaign, shared across workers.
#[derive(Debug, Default)]
pub struct ConsultedRecords {
    records: DashMap<String, GroundMotionEntry>,
}

impl ConsultedRecords {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `record` was consulted.
    pub fn note(&self, record: &GroundMotionRecord) {
        self.records
            .entry(record.filename.clone())
            .or_insert_with(|| record.entry());
    }

    /// Number of distinct records consulted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was consulted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consulted records sorted by filename.
    #[must_use]
    pub fn to_table(&self) -> GroundMotionTable {
        let mut entries: Vec<GroundMotionEntry> =
            self.records.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        GroundMotionTable::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> GroundMotionTable {
        GroundMotionTable::new(vec![
            GroundMotionEntry {
                filename: "RSN125".into(),
                scale_factor: 2.0,
                reference_intensity: 1.017,
            },
            GroundMotionEntry {
                filename: "RSN726".into(),
                scale_factor: 4.0,
                reference_intensity: 0.98,
            },
        ])
    }

    #[test]
    fn test_load_csv_strips_extension_and_ignores_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gmList.csv");
        std::fs::write(
            &path,
            "RSN,filename,scaleFactorS1,scaledSa1,magnitude\n\
             125,RSN125_FRIULI.AT2,2.5,1.017,6.5\n\
             726,RSN726_SUPER.AT2,3.1,1.02,6.54\n",
        )
        .unwrap();

        let table = GroundMotionTable::load_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        let entry = table.get("RSN125_FRIULI").unwrap();
        assert!((entry.scale_factor - 2.5).abs() < f64::EPSILON);
        assert!((entry.reference_intensity - 1.017).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_csv_requires_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gmList.csv");
        std::fs::write(&path, "filename,scaleFactorS1\nA.AT2,1.0\n").unwrap();

        let err = GroundMotionTable::load_csv(&path).unwrap_err();
        assert!(err.to_string().contains("scaledSa1"));
    }

    #[test]
    fn test_table_matcher_rescales_to_target() {
        let matcher = TableMatcher::new(table(), GroundMotionConfig::default()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.017), ("S1Ampli", 2.0)]).unwrap();

        let first = matcher.select(0, &params).unwrap();
        assert_eq!(first.filename, "RSN125");
        assert!((first.scale_factor - 4.0).abs() < 1e-12);

        let wrapped = matcher.select(3, &params).unwrap();
        assert_eq!(wrapped.filename, "RSN726");
        assert!((wrapped.scale_factor - 8.0).abs() < 1e-12);
        assert!((wrapped.table_scale_factor - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_table_matcher_missing_intensity_param() {
        let matcher = TableMatcher::new(table(), GroundMotionConfig::default()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.0)]).unwrap();
        assert!(matcher.select(0, &params).is_err());
    }

    #[test]
    fn test_consulted_records_deduplicate_and_sort() {
        let matcher = TableMatcher::new(table(), GroundMotionConfig::default()).unwrap();
        let params = ParameterSet::from_pairs([("S1", 1.0), ("S1Ampli", 1.0)]).unwrap();
        let consulted = ConsultedRecords::new();
        for idx in [1, 0, 1, 3] {
            consulted.note(&matcher.select(idx, &params).unwrap());
        }

        let table = consulted.to_table();
        let names: Vec<_> = table.entries().iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["RSN125", "RSN726"]);
        assert!((table.entries()[1].scale_factor - 4.0).abs() < f64::EPSILON);
    }
}

//! Campaign dataset storage (Arrow/CSV/Parquet)
//!
//! **Append-Only Write Pattern**:
//! - One row per analysed sample, never updated after it is appended
//! - Checkpoints rewrite the whole table (small: one row per sample)
//! - Final artifacts: CSV for the analysis scripts, optional Parquet copy
//!
//! Toyota Way Principles:
//! - Poka-Yoke: every row must share the first row's schema
//! - Jidoka: checkpoints are written to a temp file and renamed, so a crash
//!   never leaves a torn table behind

use crate::ground_motion::GroundMotionTable;
use crate::record::{FieldValue, RunRecord};
use crate::{Error, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ordered, append-only collection of run records.
#[derive(Debug, Clone, Default)]
pub struct CampaignDataset {
    rows: Vec<RunRecord>,
}

impl CampaignDataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in append order.
    #[must_use]
    pub fn rows(&self) -> &[RunRecord] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows that count toward the campaign target.
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_usable()).count()
    }

    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns error if the record's parameter names or story count differ
    /// from the rows already stored
    pub fn append(&mut self, record: RunRecord) -> Result<()> {
        if let Some(first) = self.rows.first() {
            let same_params = first.parameters().names().eq(record.parameters().names());
            if !same_params || first.stories() != record.stories() {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected parameters {:?} with {} stories, got {:?} with {}",
                    first.parameters().names().collect::<Vec<_>>(),
                    first.stories(),
                    record.parameters().names().collect::<Vec<_>>(),
                    record.stories()
                )));
            }
        }
        self.rows.push(record);
        Ok(())
    }

    /// Arrow representation: parameter columns then derived columns.
    ///
    /// Returns `None` for an empty dataset (no schema to speak of).
    ///
    /// # Errors
    ///
    /// Returns error if the batch cannot be assembled
    pub fn to_record_batch(&self) -> Result<Option<RecordBatch>> {
        let Some(first) = self.rows.first() else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for (idx, name) in first.parameters().names().enumerate() {
            fields.push(Field::new(name, DataType::Float64, false));
            let values = self.rows.iter().map(|r| {
                r.parameters()
                    .iter()
                    .nth(idx)
                    .map_or(f64::NAN, |(_, value)| value)
            });
            columns.push(Arc::new(Float64Array::from_iter_values(values)));
        }

        let derived: Vec<Vec<(String, FieldValue)>> =
            self.rows.iter().map(RunRecord::derived_fields).collect();
        for (idx, (name, kind)) in derived[0].iter().enumerate() {
            let cells = derived.iter().map(|row| &row[idx].1);
            let (data_type, column): (DataType, ArrayRef) = match kind {
                FieldValue::Float(_) => (
                    DataType::Float64,
                    Arc::new(Float64Array::from_iter(cells.map(|c| match c {
                        FieldValue::Float(v) => *v,
                        _ => None,
                    }))),
                ),
                FieldValue::Int(_) => (
                    DataType::Int64,
                    Arc::new(Int64Array::from_iter(cells.map(|c| match c {
                        FieldValue::Int(v) => Some(*v),
                        _ => None,
                    }))),
                ),
                FieldValue::Text(_) => (
                    DataType::Utf8,
                    Arc::new(StringArray::from_iter(cells.map(|c| match c {
                        FieldValue::Text(v) => Some(v.as_str()),
                        _ => None,
                    }))),
                ),
            };
            fields.push(Field::new(name.as_str(), data_type, true));
            columns.push(column);
        }

        Ok(Some(RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            columns,
        )?))
    }

    /// Write the dataset as headered CSV.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match self.to_record_batch()? {
            Some(batch) => write_batch_csv(&batch, path.as_ref()),
            None => {
                ensure_parent(path.as_ref())?;
                File::create(path.as_ref())?;
                Ok(())
            }
        }
    }

    /// Write the dataset as CSV via a temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns error if the temp file cannot be written or renamed
    pub fn write_csv_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = temp_path(path);
        self.write_csv(&tmp)?;
        fs::rename(&tmp, path).map_err(|e| {
            Error::StorageError(format!("Failed to move checkpoint into place: {e}"))
        })
    }

    /// Write the dataset as Parquet. An empty dataset writes nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let Some(batch) = self.to_record_batch()? else {
            return Ok(());
        };
        ensure_parent(path.as_ref())?;
        let file = File::create(path.as_ref())?;
        let mut writer = parquet::arrow::ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

/// Write a ground-motion table as headered CSV.
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn write_ground_motions_csv<P: AsRef<Path>>(table: &GroundMotionTable, path: P) -> Result<()> {
    write_batch_csv(&table.to_record_batch()?, path.as_ref())
}

fn write_batch_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| {
        Error::StorageError(format!("Failed to create {}: {e}", path.display()))
    })?;
    let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

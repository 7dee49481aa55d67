//! Solver time-series tables
//!
//! Recorder output is whitespace-delimited, headerless, one row per analysis
//! step with simulation time in the first column. Rows may carry trailing
//! columns we do not use; they may not be shorter than expected.

use crate::{Error, Result};
use std::path::Path;

/// Column-major numeric table.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    columns: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    /// Build a table from columns; column 0 is time.
    ///
    /// # Errors
    /// Returns error if the columns have different lengths
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = columns.first() {
            if columns.iter().any(|c| c.len() != first.len()) {
                return Err(Error::InvalidInput("time-series columns differ in length".into()));
            }
        }
        Ok(Self { columns })
    }

    /// Parse recorder text, keeping the first `width` columns.
    ///
    /// # Errors
    /// Returns error on a non-numeric token, a short row, or no rows
    pub fn parse(text: &str, width: usize) -> Result<Self> {
        let mut columns = vec![Vec::new(); width];
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut count = 0;
            for (idx, token) in line.split_whitespace().take(width).enumerate() {
                let value = token.parse::<f64>().map_err(|_| {
                    Error::InvalidInput(format!("line {}: '{token}' is not a number", line_no + 1))
                })?;
                columns[idx].push(value);
                count += 1;
            }
            if count < width {
                return Err(Error::InvalidInput(format!(
                    "line {}: expected {width} columns, found {count}",
                    line_no + 1
                )));
            }
        }
        if columns.first().map_or(true, Vec::is_empty) {
            return Err(Error::InvalidInput("no time samples".into()));
        }
        Ok(Self { columns })
    }

    /// Read and parse a recorder file.
    ///
    /// # Errors
    /// Returns [`Error::Extraction`] naming the file if it is missing or malformed
    pub fn load(path: &Path, width: usize) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::extraction(path, e.to_string()))?;
        Self::parse(&text, width).map_err(|e| Error::extraction(path, e.to_string()))
    }

    /// Number of time samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Check if the table has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns, time included.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Simulation time column.
    #[must_use]
    pub fn time(&self) -> &[f64] {
        self.column(0)
    }

    /// Column `idx` (0 = time); empty if out of range.
    #[must_use]
    pub fn column(&self, idx: usize) -> &[f64] {
        self.columns.get(idx).map_or(&[], Vec::as_slice)
    }
}

//! Design summary artifact (`design.csv`)
//!
//! Written by the solver's design step as a `variable,value` table, the same
//! layout as the parameter input table.

use crate::record::DesignSummary;
use crate::{Error, Result};
use arrow::array::{Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Artifact name inside the output directory.
pub const DESIGN_FILE: &str = "design.csv";

/// Read the design summary.
///
/// # Errors
/// Returns [`Error::Extraction`] if the file is missing, or a required entry is
/// missing or non-numeric
pub fn load_design(path: &Path) -> Result<DesignSummary> {
    let file = File::open(path).map_err(|e| Error::extraction(path, e.to_string()))?;
    let schema = Arc::new(Schema::new(vec![
        Field::new("variable", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]));
    let reader = arrow::csv::ReaderBuilder::new(schema)
        .with_header(true)
        .build(file)
        .map_err(|e| Error::extraction(path, e.to_string()))?;

    let mut entries: FxHashMap<String, String> = FxHashMap::default();
    for batch in reader {
        let batch = batch.map_err(|e| Error::extraction(path, e.to_string()))?;
        let names = text_column(&batch, 0, path)?;
        let values = text_column(&batch, 1, path)?;
        for row in 0..batch.num_rows() {
            entries.insert(
                names.value(row).trim().to_string(),
                values.value(row).trim().to_string(),
            );
        }
    }

    let text = |key: &str| {
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::extraction(path, format!("missing '{key}'")))
    };
    let number = |key: &str| {
        let raw = text(key)?;
        raw.parse::<f64>()
            .map_err(|_| Error::extraction(path, format!("'{key}' = '{raw}' is not a number")))
    };

    Ok(DesignSummary {
        mu: [number("mu1")?, number("mu2")?, number("mu3")?],
        radius: [number("R1")?, number("R2")?, number("R3")?],
        moat_gap: number("moatGap")?,
        beam: text("beam")?,
        roof_beam: text("roofBeam")?,
        col: text("col")?,
    })
}

fn text_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    idx: usize,
    path: &Path,
) -> Result<&'a StringArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::extraction(path, "design table is not text"))
}

/// Render a design summary in artifact layout.
#[must_use]
pub fn design_to_csv(design: &DesignSummary) -> String {
    let mut out = String::from("variable,value\n");
    for (i, mu) in design.mu.iter().enumerate() {
        out.push_str(&format!("mu{},{mu}\n", i + 1));
    }
    for (i, r) in design.radius.iter().enumerate() {
        out.push_str(&format!("R{},{r}\n", i + 1));
    }
    out.push_str(&format!("moatGap,{}\n", design.moat_gap));
    out.push_str(&format!("beam,{}\n", design.beam));
    out.push_str(&format!("roofBeam,{}\n", design.roof_beam));
    out.push_str(&format!("col,{}\n", design.col));
    out
}

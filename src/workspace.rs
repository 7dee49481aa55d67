//! Artifact workspace
//!
//! The solver reads its parameters from a fixed input file and overwrites a
//! fixed output directory, so a workspace is single-tenant: one sample at a
//! time. Parallel campaigns give every worker its own root via
//! [`ArtifactWorkspace::worker`].
//!
//! ```text
//! <root>/
//!   inputs/bearingInput.csv
//!   outputs/*.csv, design.csv, runStatus.txt
//! ```

use crate::sample::ParameterSet;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the parameter input table inside `inputs/`.
pub const INPUT_FILE: &str = "bearingInput.csv";

/// Scratch directory pair used by one solver invocation at a time.
#[derive(Debug, Clone)]
pub struct ArtifactWorkspace {
    root: PathBuf,
}

impl ArtifactWorkspace {
    /// Create (or reuse) a workspace rooted at `root`.
    ///
    /// The stored root is absolute, so paths handed to a solver stay valid
    /// whatever its working directory.
    ///
    /// # Errors
    /// Returns error if the directories cannot be created
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root.join("inputs"))?;
        fs::create_dir_all(root.join("outputs"))?;
        Ok(Self {
            root: fs::canonicalize(root)?,
        })
    }

    /// Isolated workspace for parallel worker `index`.
    ///
    /// # Errors
    /// Returns error if the directories cannot be created
    pub fn worker(&self, index: usize) -> Result<Self> {
        Self::create(self.root.join(format!("worker-{index}")))
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parameter input table path.
    #[must_use]
    pub fn input_path(&self) -> PathBuf {
        self.root.join("inputs").join(INPUT_FILE)
    }

    /// Solver output directory.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    /// Path of a named artifact in the output directory.
    #[must_use]
    pub fn output(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    /// Overwrite the input table with `params`.
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn write_parameters(&self, params: &ParameterSet) -> Result<()> {
        fs::write(self.input_path(), params.to_input_csv())?;
        Ok(())
    }

    /// Remove everything inside the output directory.
    ///
    /// Files and nested directories alike, so nothing from a previous attempt
    /// can be picked up by extraction.
    ///
    /// # Errors
    /// Returns error if an entry cannot be removed
    pub fn clear_outputs(&self) -> Result<()> {
        let dir = self.output_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            return Ok(());
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

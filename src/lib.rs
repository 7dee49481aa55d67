//! # quake-campaign: Simulation Campaign Controller
//!
//! **Version**: 0.1.0
//!
//! Drives a finite-element solver over a stream of sampled design parameters,
//! recovers from numerical non-convergence with a descending time-step
//! ladder, reduces each run's time-history artifacts to a fixed record of
//! response metrics, and accumulates records into a checkpointed dataset
//! until a target number of usable runs is reached.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: a solver that cannot run at all stops the campaign; a sample
//!   that cannot be analysed is skipped, logged, and never counted
//! - **Poka-Yoke**: parameter names may not shadow derived result columns
//! - **Genchi Genbutsu**: every metric is read back from the solver's own
//!   artifacts, never from solver state
//! - **Heijunka**: checkpoints at a fixed sample cadence bound lost work
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use quake_campaign::config::CampaignConfig;
//! use quake_campaign::extract::Extractor;
//! use quake_campaign::workspace::ArtifactWorkspace;
//!
//! // Reduce the artifacts of a finished run
//! let config = CampaignConfig::default();
//! let ws = ArtifactWorkspace::create(&config.paths.workspace)?;
//! let extractor = Extractor::new(config.limits);
//! let artifacts = quake_campaign::extract::RunArtifacts::load(&ws, extractor.limits())?;
//! let metrics = extractor.metrics(&artifacts, 22.0)?;
//! println!("max displacement: {}", metrics.max_displacement);
//! # Ok::<(), quake_campaign::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod campaign;
pub mod config;
pub mod error;
pub mod extract;
pub mod ground_motion;
pub mod record;
pub mod retry;
pub mod sample;
pub mod solver;
pub mod storage;
pub mod workspace;

pub use error::{Error, Result};

//! Resumable experiment campaign orchestration for external scripts.
//!
//! A campaign binds an external command to a declared parameter space,
//! expands caller-requested grids, runs only the combinations not yet
//! recorded, captures per-run artifacts, and persists every result
//! durably so campaigns survive process restarts.

mod campaign;
mod grid;
mod hash;
mod paths;
mod result;
mod runner;
mod store;

pub use campaign::{Campaign, MissingRuns};
pub use grid::expand;
pub use hash::stable_hash_string;
pub use result::{ArtifactSet, RunResult};
pub use runner::{ResultStream, Runner};
pub use store::{CampaignConfig, ResultStore};

pub use runex_core::{
    DefaultSpec, ErrorInfo, FieldSpec, Override, OverrideValue, ParamValue, ParameterSet,
    RunexError, SchemaVersion,
};

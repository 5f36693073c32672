use std::collections::BTreeMap;
use std::path::PathBuf;

use runex_core::ParameterSet;
use serde::{Deserialize, Serialize};

/// Mapping from artifact file name to its absolute path inside a run's
/// private directory. Computed on demand, never persisted.
pub type ArtifactSet = BTreeMap<String, PathBuf>;

/// Immutable record of one completed external-process run.
///
/// Constructed once per run and appended to the store; the parameter map
/// is owned exclusively by the value, so no caller can alias or mutate it
/// after construction. Field names match the persisted record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Globally unique run id within the campaign.
    pub id: String,
    /// Elapsed wall-clock seconds from launch to process exit.
    pub time: f64,
    /// Exit code reported by the process; -1 when killed by a signal.
    pub exitcode: i32,
    /// Fully resolved parameter combination the run executed.
    pub params: ParameterSet,
}

impl RunResult {
    /// Builds a result, taking ownership of the parameter map.
    pub fn new(id: impl Into<String>, time: f64, exitcode: i32, params: ParameterSet) -> Self {
        Self {
            id: id.into(),
            time,
            exitcode,
            params,
        }
    }
}

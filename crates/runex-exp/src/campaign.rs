use std::path::Path;

use runex_core::errors::{ErrorInfo, RunexError};
use runex_core::{DefaultSpec, Override, ParameterSet};
use tracing::info;

use crate::grid;
use crate::paths::{abs_if_existing, absolute_path};
use crate::result::{ArtifactSet, RunResult};
use crate::runner::Runner;
use crate::store::{CampaignConfig, ResultStore};

/// Orchestrator for one persisted parameter sweep.
///
/// A campaign binds an external command and a default spec to a root
/// directory, owns the result store living there, and derives which
/// parameter combinations still need runs. Re-invoking the same campaign
/// after an abort or crash re-derives the remaining deficit and continues
/// where the previous process stopped.
pub struct Campaign {
    store: ResultStore,
}

impl std::fmt::Debug for Campaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign").finish_non_exhaustive()
    }
}

impl Campaign {
    /// Creates a campaign at `root`, or reopens a matching one.
    ///
    /// When the root already exists and `overwrite` is false the existing
    /// campaign is loaded and its persisted command and defaults must
    /// equal the requested ones value-for-value; any difference fails
    /// with `config-conflict`. Command tokens naming an existing path are
    /// absolutized, since runs execute from private working directories.
    pub fn create(
        command: Vec<String>,
        root: impl AsRef<Path>,
        defaults: DefaultSpec,
        overwrite: bool,
    ) -> Result<Self, RunexError> {
        let root = absolute_path(root.as_ref())?;
        let command: Vec<String> = command.iter().map(|token| abs_if_existing(token)).collect();

        if root.exists() && !overwrite {
            let campaign = Self::load(&root)?;
            let config = campaign.store.config();
            if config.command != command {
                return Err(RunexError::Config(
                    ErrorInfo::new("config-conflict", "existing campaign uses a different command")
                        .with_context("stored", config.command.join(" "))
                        .with_context("requested", command.join(" ")),
                ));
            }
            if config.defaults != defaults {
                return Err(RunexError::Config(
                    ErrorInfo::new(
                        "config-conflict",
                        "existing campaign declares different parameters",
                    )
                    .with_context("path", root.display().to_string()),
                ));
            }
            return Ok(campaign);
        }

        let store = ResultStore::create(CampaignConfig::new(command, root, defaults), overwrite)?;
        Ok(Self { store })
    }

    /// Opens the campaign persisted at `root`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, RunexError> {
        Ok(Self {
            store: ResultStore::load(root)?,
        })
    }

    /// Returns the persisted campaign configuration.
    pub fn config(&self) -> &CampaignConfig {
        self.store.config()
    }

    /// Read access to the underlying result store.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Lazily yields each combination of the sweep as many times as runs
    /// are still missing to reach `replicas` recorded results for it.
    ///
    /// Counts are taken against the store when the iterator is pulled,
    /// so combinations satisfied by earlier invocations are skipped and
    /// partially satisfied ones yield only the remaining deficit.
    pub fn missing_runs<'a>(
        &'a self,
        sweep: &Override,
        replicas: usize,
    ) -> Result<MissingRuns<'a>, RunexError> {
        let expanded = grid::expand(&self.store.config().defaults, sweep)?;
        Ok(MissingRuns {
            store: &self.store,
            replicas,
            queue: expanded.into_iter(),
            pending: None,
        })
    }

    /// Runs every missing combination of the sweep and persists each
    /// result as it arrives.
    ///
    /// Persistence is incremental: every received result is inserted and
    /// fsynced before the next one is pulled from the runner, so a crash
    /// loses at most the runs still in flight. Returns the number of runs
    /// recorded by this invocation.
    pub fn run_missing(
        &mut self,
        runner: &Runner,
        sweep: &Override,
        replicas: usize,
    ) -> Result<usize, RunexError> {
        let pending: Vec<ParameterSet> = self.missing_runs(sweep, replicas)?.collect();
        info!(missing = pending.len(), "dispatching missing runs");
        let command = self.store.config().command.clone();
        let data_dir = self.store.data_dir();
        let stream = runner.execute(&command, &data_dir, pending)?;
        let mut recorded = 0;
        for outcome in stream {
            self.store.insert(outcome?)?;
            recorded += 1;
        }
        Ok(recorded)
    }

    /// Inserts a result produced out of band.
    pub fn write_result(&mut self, result: RunResult) -> Result<(), RunexError> {
        self.store.insert(result)
    }

    /// Returns every stored result matching the sweep, paired with the
    /// artifacts found in its run directory.
    pub fn results_for(
        &self,
        sweep: &Override,
    ) -> Result<Vec<(RunResult, ArtifactSet)>, RunexError> {
        let mut out = Vec::new();
        for combination in grid::expand(&self.store.config().defaults, sweep)? {
            for result in self.store.query_matching(&combination) {
                let artifacts = self.store.artifacts_for(&result)?;
                out.push((result, artifacts));
            }
        }
        Ok(out)
    }

    /// Returns every stored result paired with its artifacts.
    pub fn all_results(&self) -> Result<Vec<(RunResult, ArtifactSet)>, RunexError> {
        let mut out = Vec::new();
        for result in self.store.query_matching(&ParameterSet::new()) {
            let artifacts = self.store.artifacts_for(&result)?;
            out.push((result, artifacts));
        }
        Ok(out)
    }
}

/// Lazy sequence of parameter sets still lacking recorded runs.
pub struct MissingRuns<'a> {
    store: &'a ResultStore,
    replicas: usize,
    queue: std::vec::IntoIter<ParameterSet>,
    pending: Option<(ParameterSet, usize)>,
}

impl Iterator for MissingRuns<'_> {
    type Item = ParameterSet;

    fn next(&mut self) -> Option<ParameterSet> {
        loop {
            if let Some((params, remaining)) = self.pending.take() {
                if remaining > 1 {
                    self.pending = Some((params.clone(), remaining - 1));
                }
                return Some(params);
            }
            let params = self.queue.next()?;
            let existing = self.store.count_matching(&params);
            let deficit = self.replicas.saturating_sub(existing);
            if deficit > 0 {
                self.pending = Some((params, deficit));
            }
        }
    }
}

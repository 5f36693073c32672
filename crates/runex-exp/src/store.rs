use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use runex_core::errors::{ErrorInfo, RunexError};
use runex_core::{DefaultSpec, ParameterSet, SchemaVersion};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hash::stable_hash_string;
use crate::paths::absolute_path;
use crate::result::{ArtifactSet, RunResult};

/// Immutable campaign configuration, persisted exactly once as the
/// singleton `config` record of the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// External command vector (script plus fixed arguments).
    pub command: Vec<String>,
    /// Absolute campaign root directory.
    pub root: PathBuf,
    /// Declared parameter fields and defaults.
    pub defaults: DefaultSpec,
    /// Schema version the store was written at.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// RFC 3339 timestamp recording when the campaign was created.
    #[serde(default)]
    pub created_at: String,
}

impl CampaignConfig {
    /// Builds a config stamped with the current schema version and time.
    pub fn new(command: Vec<String>, root: PathBuf, defaults: DefaultSpec) -> Self {
        Self {
            command,
            root,
            defaults,
            schema_version: SchemaVersion::CURRENT,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Owned record shapes read back from the store file. The `table` tag
/// separates the two logical collections sharing the one file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "table", rename_all = "lowercase")]
enum StoreRecord {
    Config(CampaignConfig),
    Result(RunResult),
}

/// Borrowed counterpart of [`StoreRecord`] used when appending.
#[derive(Serialize)]
#[serde(tag = "table", rename_all = "lowercase")]
enum RecordRef<'a> {
    Config(&'a CampaignConfig),
    Result(&'a RunResult),
}

/// Document-backed, append-only store of campaign configuration and
/// completed-run records.
///
/// One line-delimited JSON file under the campaign root holds the
/// singleton config record followed by result records; every insert is
/// flushed and fsynced before returning, which makes a successful call
/// the durability checkpoint. Queries are answered from an in-memory
/// index rebuilt on load.
pub struct ResultStore {
    root: PathBuf,
    log: File,
    config: CampaignConfig,
    field_names: BTreeSet<String>,
    results: Vec<RunResult>,
    ids: HashSet<String>,
    replica_counts: HashMap<String, usize>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore").finish_non_exhaustive()
    }
}

impl ResultStore {
    /// Creates a fresh store under `config.root`.
    ///
    /// An existing root without `overwrite` fails with `directory-exists`.
    /// With `overwrite`, the root's contents must be a subset of the data
    /// directory and the store file; anything else fails with
    /// `directory-collision` before any destructive action.
    pub fn create(config: CampaignConfig, overwrite: bool) -> Result<Self, RunexError> {
        config.defaults.ensure_unique_names()?;
        let root = config.root.clone();
        let store_name = store_file_name(&root);

        if root.exists() {
            if !overwrite {
                return Err(RunexError::Store(
                    ErrorInfo::new("directory-exists", "campaign root already exists")
                        .with_context("path", root.display().to_string())
                        .with_hint("pass overwrite to discard the existing campaign"),
                ));
            }
            refuse_foreign_contents(&root, &store_name)?;
            fs::remove_dir_all(&root).map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-io", "failed to remove campaign root")
                        .with_context("path", root.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        }

        fs::create_dir_all(root.join("data")).map_err(|err| {
            RunexError::Store(
                ErrorInfo::new("store-io", "failed to create campaign root")
                    .with_context("path", root.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;

        let store_path = root.join(&store_name);
        let mut log = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&store_path)
            .map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-io", "failed to create store file")
                        .with_context("path", store_path.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        append_record(&mut log, &RecordRef::Config(&config))?;
        debug!(root = %root.display(), "created campaign store");

        let field_names = config.defaults.names().map(str::to_string).collect();
        Ok(Self {
            root,
            log,
            config,
            field_names,
            results: Vec::new(),
            ids: HashSet::new(),
            replica_counts: HashMap::new(),
        })
    }

    /// Opens an existing store, replaying the log into the in-memory
    /// index. Fails with `campaign-not-found` when the root or store file
    /// is absent.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, RunexError> {
        let root = absolute_path(root.as_ref())?;
        if !root.exists() {
            return Err(RunexError::Store(
                ErrorInfo::new("campaign-not-found", "campaign root does not exist")
                    .with_context("path", root.display().to_string()),
            ));
        }
        let store_path = root.join(store_file_name(&root));
        if !store_path.exists() {
            return Err(RunexError::Store(
                ErrorInfo::new("campaign-not-found", "store file missing from campaign root")
                    .with_context("path", store_path.display().to_string()),
            ));
        }

        let file = File::open(&store_path).map_err(|err| {
            RunexError::Store(
                ErrorInfo::new("store-io", "failed to open store file")
                    .with_context("path", store_path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;

        let mut config: Option<CampaignConfig> = None;
        let mut results = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-io", "failed to read store file")
                        .with_context("line", (idx + 1).to_string())
                        .with_hint(err.to_string()),
                )
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: StoreRecord = serde_json::from_str(&line).map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-decode", "corrupt record in store file")
                        .with_context("line", (idx + 1).to_string())
                        .with_hint(err.to_string()),
                )
            })?;
            match record {
                StoreRecord::Config(found) => {
                    if config.replace(found).is_some() {
                        return Err(RunexError::Store(ErrorInfo::new(
                            "store-decode",
                            "store file holds more than one config record",
                        )));
                    }
                }
                StoreRecord::Result(result) => results.push(result),
            }
        }
        let config = config.ok_or_else(|| {
            RunexError::Store(
                ErrorInfo::new("store-decode", "store file holds no config record")
                    .with_context("path", store_path.display().to_string()),
            )
        })?;
        if !SchemaVersion::CURRENT.compatible_with(&config.schema_version) {
            return Err(RunexError::Store(
                ErrorInfo::new("schema-version", "store written by an incompatible version")
                    .with_context("found", format!("{:?}", config.schema_version)),
            ));
        }

        let mut ids = HashSet::new();
        let mut replica_counts: HashMap<String, usize> = HashMap::new();
        for result in &results {
            if !ids.insert(result.id.clone()) {
                return Err(RunexError::Store(
                    ErrorInfo::new("duplicate-id", "store file holds duplicate run ids")
                        .with_context("id", result.id.clone()),
                ));
            }
            if let Ok(key) = stable_hash_string(&result.params) {
                *replica_counts.entry(key).or_insert(0) += 1;
            }
        }

        let log = OpenOptions::new()
            .append(true)
            .open(&store_path)
            .map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-io", "failed to reopen store file for append")
                        .with_context("path", store_path.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        debug!(root = %root.display(), results = results.len(), "loaded campaign store");

        let field_names = config.defaults.names().map(str::to_string).collect();
        Ok(Self {
            root,
            log,
            config,
            field_names,
            results,
            ids,
            replica_counts,
        })
    }

    /// Returns the persisted campaign configuration.
    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Returns the campaign root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding one subdirectory per run id.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Counts stored results whose parameters match every supplied field
    /// exactly. An empty filter matches every record.
    pub fn count_matching(&self, filter: &ParameterSet) -> usize {
        if self.is_full_key_set(filter) {
            if let Ok(key) = stable_hash_string(filter) {
                return self.replica_counts.get(&key).copied().unwrap_or(0);
            }
        }
        self.results
            .iter()
            .filter(|result| matches_filter(result, filter))
            .count()
    }

    /// Returns the stored results whose parameters match every supplied
    /// field exactly, in insertion order.
    pub fn query_matching(&self, filter: &ParameterSet) -> Vec<RunResult> {
        self.results
            .iter()
            .filter(|result| matches_filter(result, filter))
            .cloned()
            .collect()
    }

    /// Appends a result and fsyncs the store file before returning.
    ///
    /// Fails with `schema-mismatch` when the result's key set differs
    /// from the declared fields and with `duplicate-id` when the id is
    /// already present; a failed insert leaves the store untouched.
    pub fn insert(&mut self, result: RunResult) -> Result<(), RunexError> {
        let keys: BTreeSet<&str> = result.params.keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = self.field_names.iter().map(String::as_str).collect();
        if keys != expected {
            return Err(RunexError::Store(
                ErrorInfo::new("schema-mismatch", "result fields differ from declared fields")
                    .with_context("expected", join_names(&expected))
                    .with_context("found", join_names(&keys)),
            ));
        }
        if self.ids.contains(&result.id) {
            return Err(RunexError::Store(
                ErrorInfo::new("duplicate-id", "a result with this id is already stored")
                    .with_context("id", result.id.clone()),
            ));
        }

        append_record(&mut self.log, &RecordRef::Result(&result))?;

        self.ids.insert(result.id.clone());
        if let Ok(key) = stable_hash_string(&result.params) {
            *self.replica_counts.entry(key).or_insert(0) += 1;
        }
        debug!(id = %result.id, exitcode = result.exitcode, "inserted run result");
        self.results.push(result);
        Ok(())
    }

    /// Lists the artifacts in a run's private directory as name → path.
    /// An absent or empty directory yields an empty map.
    pub fn artifacts_for(&self, result: &RunResult) -> Result<ArtifactSet, RunexError> {
        let run_dir = self.data_dir().join(&result.id);
        let entries = match fs::read_dir(&run_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ArtifactSet::new()),
            Err(err) => {
                return Err(RunexError::Store(
                    ErrorInfo::new("store-io", "failed to list run directory")
                        .with_context("path", run_dir.display().to_string())
                        .with_hint(err.to_string()),
                ));
            }
        };
        let mut artifacts = ArtifactSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                RunexError::Store(
                    ErrorInfo::new("store-io", "failed to list run directory")
                        .with_context("path", run_dir.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            artifacts.insert(name, run_dir.join(entry.file_name()));
        }
        Ok(artifacts)
    }

    fn is_full_key_set(&self, filter: &ParameterSet) -> bool {
        filter.len() == self.field_names.len()
            && filter.keys().all(|name| self.field_names.contains(name))
    }
}

fn matches_filter(result: &RunResult, filter: &ParameterSet) -> bool {
    filter
        .iter()
        .all(|(name, value)| result.params.get(name) == Some(value))
}

fn join_names(names: &BTreeSet<&str>) -> String {
    names.iter().copied().collect::<Vec<_>>().join(", ")
}

fn store_file_name(root: &Path) -> String {
    let base = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "campaign".to_string());
    format!("{base}.jsonl")
}

fn refuse_foreign_contents(root: &Path, store_name: &str) -> Result<(), RunexError> {
    let entries = fs::read_dir(root).map_err(|err| {
        RunexError::Store(
            ErrorInfo::new("store-io", "failed to list campaign root")
                .with_context("path", root.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| {
            RunexError::Store(
                ErrorInfo::new("store-io", "failed to list campaign root")
                    .with_context("path", root.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != "data" && name != store_name {
            return Err(RunexError::Store(
                ErrorInfo::new("directory-collision", "campaign root contains foreign files")
                    .with_context("path", root.display().to_string())
                    .with_context("entry", name)
                    .with_hint("remove the unexpected files or choose another root"),
            ));
        }
    }
    Ok(())
}

fn append_record(log: &mut File, record: &RecordRef<'_>) -> Result<(), RunexError> {
    let mut line = serde_json::to_vec(record).map_err(|err| {
        RunexError::Store(
            ErrorInfo::new("store-encode", "failed to encode store record")
                .with_hint(err.to_string()),
        )
    })?;
    line.push(b'\n');
    log.write_all(&line).map_err(|err| {
        RunexError::Store(
            ErrorInfo::new("store-io", "failed to append to store file")
                .with_hint(err.to_string()),
        )
    })?;
    log.sync_all().map_err(|err| {
        RunexError::Store(
            ErrorInfo::new("store-io", "failed to flush store file")
                .with_hint(err.to_string()),
        )
    })
}

// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging per-shard result files into one canonical run report.
//!
//! A sharded test execution leaves one `shard-<suffix>.json` file per worker
//! in the run directory. [`merge_run_dir`] folds every readable shard into a
//! single [`RunReport`] and writes it to `report.json` in the same directory.
//!
//! The fold is performed by [`ShardMerger`]. Counters, duration, the run
//! timestamp and the multiset of test records do not depend on the order in
//! which shards are added.

use crate::{
    RunUuid,
    errors::{DisplayErrorChain, ReportReadError, ShardMergeError, ShardReadError},
    helpers::{plural_s, write_json_atomic},
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset, Utc};
use itertools::Itertools;
use runledger_metadata::{
    REPORT_FORMAT_VERSION, ReportMetadata, RunRecord, RunReport, RunTimestamp, TestRecord,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// The prefix of shard result file names.
pub const SHARD_FILE_PREFIX: &str = "shard-";

/// The suffix of shard result file names.
pub const SHARD_FILE_SUFFIX: &str = ".json";

/// The file name of the canonical run report within a run directory.
pub const CANONICAL_REPORT_FILE_NAME: &str = "report.json";

/// Returns true if `file_name` follows the shard naming convention.
pub fn is_shard_file_name(file_name: &str) -> bool {
    file_name
        .strip_prefix(SHARD_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(SHARD_FILE_SUFFIX))
        .is_some_and(|suffix| !suffix.is_empty())
}

/// Options for merging a run directory.
#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    /// An authoritative run ID. If set, it takes precedence over any ID found
    /// in the shards.
    pub run_id: Option<String>,

    /// The generation time recorded in the report metadata. Defaults to now.
    pub generated_at: Option<DateTime<FixedOffset>>,
}

/// The result of merging a run directory.
#[derive(Debug)]
pub struct MergeOutcome {
    /// The canonical report that was written.
    pub report: RunReport,

    /// Where the canonical report was written.
    pub report_path: Utf8PathBuf,

    /// File names of the shards that were merged, in file name order.
    pub merged_shards: Vec<String>,

    /// Shards that were skipped, in file name order.
    pub skipped_shards: Vec<SkippedShard>,
}

/// A shard that could not be merged.
#[derive(Debug)]
pub struct SkippedShard {
    /// The shard's file name.
    pub file_name: String,

    /// Why the shard was skipped.
    pub error: ShardReadError,
}

/// Lists the shard files in `run_dir`, sorted by file name.
///
/// Directories and files that do not match the shard naming convention
/// (including the canonical report) are ignored.
pub fn discover_shard_files(run_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ShardMergeError> {
    let entries = run_dir
        .read_dir_utf8()
        .map_err(|error| ShardMergeError::ReadRunDir {
            dir: run_dir.to_owned(),
            error,
        })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    "ignoring unreadable entry in run directory {run_dir}: {}",
                    DisplayErrorChain::new(&error),
                );
                continue;
            }
        };
        if !is_shard_file_name(entry.file_name()) {
            continue;
        }
        if !entry.path().is_file() {
            debug!("ignoring {}: not a file", entry.path());
            continue;
        }
        paths.push(entry.into_path());
    }

    paths.sort_unstable();
    debug!(
        "found {} shard file{} in {run_dir}",
        paths.len(),
        plural_s(paths.len()),
    );
    Ok(paths)
}

/// Merges every shard file in `run_dir` and writes the canonical report.
///
/// Shards that cannot be read or are structurally invalid are skipped with a
/// warning. Returns [`ShardMergeError::NoValidShards`] if no shard could be
/// merged. Any existing canonical report is overwritten.
pub fn merge_run_dir(
    run_dir: &Utf8Path,
    options: &MergeOptions,
) -> Result<MergeOutcome, ShardMergeError> {
    let shard_paths = discover_shard_files(run_dir)?;
    merge_shards(run_dir, &shard_paths, options)
}

/// Merges the given shard files and writes the canonical report into
/// `run_dir`.
pub fn merge_shards(
    run_dir: &Utf8Path,
    shard_paths: &[Utf8PathBuf],
    options: &MergeOptions,
) -> Result<MergeOutcome, ShardMergeError> {
    let mut merger = ShardMerger::new();
    let mut merged_shards = Vec::new();
    let mut skipped_shards = Vec::new();

    for path in shard_paths {
        let file_name = path.file_name().unwrap_or(path.as_str()).to_owned();
        match read_shard(path) {
            Ok(shard) => {
                debug!("merging {file_name} ({} tests)", shard.tests.len());
                merger.add(shard);
                merged_shards.push(file_name);
            }
            Err(error) => {
                warn!("skipping shard: {}", DisplayErrorChain::new(&error));
                skipped_shards.push(SkippedShard { file_name, error });
            }
        }
    }

    if merged_shards.is_empty() {
        return Err(ShardMergeError::NoValidShards {
            dir: run_dir.to_owned(),
            candidates: shard_paths.len(),
            skipped: skipped_shards.len(),
        });
    }

    let mut report = merger.finish(options.run_id.as_deref());
    report.metadata = Some(ReportMetadata {
        generated_at: options
            .generated_at
            .unwrap_or_else(|| Utc::now().fixed_offset()),
        format_version: REPORT_FORMAT_VERSION,
        shard_count: merged_shards.len(),
        skipped_shards: skipped_shards
            .iter()
            .map(|skipped| skipped.file_name.clone())
            .collect(),
        worker_distribution: worker_distribution(&report.tests),
    });

    let report_path = run_dir.join(CANONICAL_REPORT_FILE_NAME);
    write_json_atomic(&report_path, &report).map_err(|error| ShardMergeError::ReportWrite {
        path: report_path.clone(),
        error,
    })?;

    info!(
        "merged {} shard{} into {report_path} ({} test{}, {} skipped shard{})",
        merged_shards.len(),
        plural_s(merged_shards.len()),
        report.tests.len(),
        plural_s(report.tests.len()),
        skipped_shards.len(),
        plural_s(skipped_shards.len()),
    );

    Ok(MergeOutcome {
        report,
        report_path,
        merged_shards,
        skipped_shards,
    })
}

/// Reads and structurally validates a single shard file.
///
/// A shard must contain a `run` object with `totalTests`, `passed`, `failed`
/// and `skipped` counters, and a `tests` list. A missing `duration` is
/// treated as zero. Any report metadata in the shard is discarded.
pub fn read_shard(path: &Utf8Path) -> Result<RunReport, ShardReadError> {
    let contents = std::fs::read_to_string(path).map_err(|error| ShardReadError::Read {
        path: path.to_owned(),
        error,
    })?;
    if contents.trim().is_empty() {
        return Err(ShardReadError::Empty {
            path: path.to_owned(),
        });
    }

    let mut value: Value =
        serde_json::from_str(&contents).map_err(|error| ShardReadError::Deserialize {
            path: path.to_owned(),
            error,
        })?;
    check_required_fields(path, &value)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("metadata");
    }

    serde_json::from_value(value).map_err(|error| ShardReadError::Deserialize {
        path: path.to_owned(),
        error,
    })
}

/// Reads an existing canonical (or unsharded) run report.
pub fn read_run_report(path: &Utf8Path) -> Result<RunReport, ReportReadError> {
    let contents = std::fs::read_to_string(path).map_err(|error| ReportReadError::Read {
        path: path.to_owned(),
        error,
    })?;
    serde_json::from_str(&contents).map_err(|error| ReportReadError::Deserialize {
        path: path.to_owned(),
        error,
    })
}

/// Required fields of the `run` object: the JSON key, and the dotted path
/// used in error messages.
const REQUIRED_RUN_FIELDS: [(&str, &str); 4] = [
    ("totalTests", "run.totalTests"),
    ("passed", "run.passed"),
    ("failed", "run.failed"),
    ("skipped", "run.skipped"),
];

fn check_required_fields(path: &Utf8Path, value: &Value) -> Result<(), ShardReadError> {
    let missing = |field| ShardReadError::MissingField {
        path: path.to_owned(),
        field,
    };

    let run = present(value, "run").ok_or_else(|| missing("run"))?;
    for (key, field) in REQUIRED_RUN_FIELDS {
        if present(run, key).is_none() {
            return Err(missing(field));
        }
    }
    present(value, "tests").ok_or_else(|| missing("tests"))?;
    Ok(())
}

fn present<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|value| !value.is_null())
}

fn worker_distribution(tests: &[TestRecord]) -> BTreeMap<u32, usize> {
    tests
        .iter()
        .filter_map(|test| test.worker_id)
        .counts()
        .into_iter()
        .collect()
}

/// Accumulates shards into a single run report.
#[derive(Debug, Default)]
pub struct ShardMerger {
    shard_count: usize,
    total_tests: u64,
    passed: u64,
    failed: u64,
    skipped: u64,
    duration: u64,
    tests: Vec<TestRecord>,
    latest_timestamp: Option<DateTime<Utc>>,
    environment: Option<EnvironmentCandidate>,
    ids: BTreeSet<String>,
}

impl ShardMerger {
    /// Creates an empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of shards added so far.
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Adds a shard to the merge.
    pub fn add(&mut self, shard: RunReport) {
        let RunReport { run, tests, .. } = shard;
        self.shard_count += 1;

        self.total_tests = self.total_tests.saturating_add(run.total_tests);
        self.passed = self.passed.saturating_add(run.passed);
        self.failed = self.failed.saturating_add(run.failed);
        self.skipped = self.skipped.saturating_add(run.skipped);
        self.duration = self.duration.saturating_add(run.duration);
        self.tests.extend(tests);

        let timestamp = match run.resolve_timestamp() {
            Some(Ok(timestamp)) => Some(timestamp.with_timezone(&Utc)),
            Some(Err(error)) => {
                warn!(
                    "ignoring timestamp of shard for run `{}`: {}",
                    run.id,
                    DisplayErrorChain::new(&error),
                );
                None
            }
            None => None,
        };
        self.latest_timestamp = self.latest_timestamp.max(timestamp);

        if let Some(value) = run.environment {
            let candidate = EnvironmentCandidate::new(timestamp, value);
            if self
                .environment
                .as_ref()
                .is_none_or(|current| candidate.rank() > current.rank())
            {
                self.environment = Some(candidate);
            }
        }

        if !run.id.is_empty() {
            self.ids.insert(run.id);
        }
    }

    /// Finishes the merge and returns the combined report, without metadata.
    ///
    /// The run ID is `authoritative_id` if given. Otherwise, if every shard
    /// that carries an ID carries the same one, that ID is used. Otherwise a
    /// fresh ID is minted.
    pub fn finish(self, authoritative_id: Option<&str>) -> RunReport {
        let accounted = self
            .passed
            .saturating_add(self.failed)
            .saturating_add(self.skipped);
        if self.total_tests < accounted {
            debug!(
                "merged run has {} total tests but {accounted} passed, failed or skipped",
                self.total_tests,
            );
        }

        RunReport {
            run: RunRecord {
                id: resolve_run_id(authoritative_id, self.ids),
                timestamp: self
                    .latest_timestamp
                    .map(|timestamp| RunTimestamp::from_datetime(&timestamp)),
                total_tests: self.total_tests,
                passed: self.passed,
                failed: self.failed,
                skipped: self.skipped,
                duration: self.duration,
                environment: self.environment.map(|candidate| candidate.value),
            },
            tests: self.tests,
            metadata: None,
        }
    }
}

fn resolve_run_id(authoritative_id: Option<&str>, ids: BTreeSet<String>) -> String {
    if let Some(id) = authoritative_id.filter(|id| !id.is_empty()) {
        return id.to_owned();
    }

    let id_count = ids.len();
    let mut ids = ids.into_iter();
    match (ids.next(), id_count) {
        (Some(id), 1) => id,
        _ => {
            let minted = RunUuid::new_v4();
            debug!("{id_count} distinct run IDs across shards, minted {minted}");
            minted.to_string()
        }
    }
}

/// An environment value seen in a shard, ranked by the shard's timestamp.
///
/// Ties (and shards without a timestamp) are broken by the value's JSON text
/// so that the choice does not depend on the order shards were added in.
#[derive(Debug)]
struct EnvironmentCandidate {
    timestamp: Option<DateTime<Utc>>,
    text: String,
    value: Value,
}

impl EnvironmentCandidate {
    fn new(timestamp: Option<DateTime<Utc>>, value: Value) -> Self {
        Self {
            timestamp,
            text: value.to_string(),
            value,
        }
    }

    fn rank(&self) -> (Option<DateTime<Utc>>, &str) {
        (self.timestamp, &self.text)
    }
}

// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The JSON history directory.
//!
//! Each retained run is stored as `run-<runKey>.json` in the history
//! directory. Archiving a run writes its file, then deletes the files with
//! the oldest keys until at most `max_runs` remain. The directory is the
//! only state: there is no separate index.

use super::{HistorySource, HistoryWindow, keys_to_evict, parse_canonical_run_key, resolve_run_key};
use crate::{
    errors::{
        ArchiveError, DisplayErrorChain, HistoryLoadError, HistoryPruneError, HistoryReadError,
    },
    helpers::{LockKind, StoreLock, plural_s, write_json_atomic},
};
use camino::{Utf8Path, Utf8PathBuf};
use runledger_metadata::{HistoryEntry, RunKey, RunRecord, RunReport, TestRecord};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, io, num::NonZero};
use tracing::{debug, info, warn};

/// The name of the history directory within the output directory.
pub const HISTORY_DIR_NAME: &str = "history";

/// The name of the lock file within the history directory.
pub const HISTORY_LOCK_FILE_NAME: &str = "history.lock";

/// The current format version of history entry files.
///
/// Entries with a newer version are skipped when loading.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

const ENTRY_FILE_PREFIX: &str = "run-";
const ENTRY_FILE_SUFFIX: &str = ".json";

/// Returns the file name of the history entry for `run_key`.
pub fn history_entry_file_name(run_key: RunKey) -> String {
    format!("{ENTRY_FILE_PREFIX}{run_key}{ENTRY_FILE_SUFFIX}")
}

/// Parses a history entry file name back into its run key.
///
/// Returns `None` for any other file name, including names whose key is not
/// an integer written the way [`history_entry_file_name`] writes it.
pub fn parse_history_entry_file_name(file_name: &str) -> Option<RunKey> {
    parse_canonical_run_key(
        file_name
            .strip_prefix(ENTRY_FILE_PREFIX)?
            .strip_suffix(ENTRY_FILE_SUFFIX)?,
    )
}

/// Archives run reports into a bounded JSON history directory.
#[derive(Clone, Debug)]
pub struct HistoryArchiver {
    dir: Utf8PathBuf,
    max_runs: NonZero<usize>,
}

impl HistoryArchiver {
    /// Creates an archiver for the history directory within `output_dir`.
    pub fn new(output_dir: &Utf8Path, max_runs: NonZero<usize>) -> Self {
        Self::with_dir(output_dir.join(HISTORY_DIR_NAME), max_runs)
    }

    /// Creates an archiver for an explicit history directory.
    pub fn with_dir(dir: impl Into<Utf8PathBuf>, max_runs: NonZero<usize>) -> Self {
        Self {
            dir: dir.into(),
            max_runs,
        }
    }

    /// Returns the history directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the maximum number of runs retained.
    pub fn max_runs(&self) -> NonZero<usize> {
        self.max_runs
    }

    /// Returns the path of the entry file for `run_key`.
    pub fn entry_path(&self, run_key: RunKey) -> Utf8PathBuf {
        self.dir.join(history_entry_file_name(run_key))
    }

    fn lock_path(&self) -> Utf8PathBuf {
        self.dir.join(HISTORY_LOCK_FILE_NAME)
    }

    /// Archives a run report, then prunes the directory to `max_runs` entries.
    ///
    /// An existing entry with the same run key is replaced. Failures while
    /// pruning are not fatal; they are returned in [`ArchiveOutcome::prune`].
    pub fn archive(&self, report: &RunReport) -> Result<ArchiveOutcome, ArchiveError> {
        let run_key = resolve_run_key(&report.run)?;

        std::fs::create_dir_all(&self.dir).map_err(|error| ArchiveError::DirCreate {
            dir: self.dir.clone(),
            error,
        })?;
        let _lock = StoreLock::acquire(&self.lock_path(), LockKind::Exclusive)?;

        let path = self.entry_path(run_key);
        let replaced = path.exists();
        if replaced {
            self.warn_on_collision(&path, run_key, &report.run);
        }

        let file = HistoryFileRef {
            format_version: HISTORY_FORMAT_VERSION,
            run_key,
            run: &report.run,
            tests: &report.tests,
        };
        write_json_atomic(&path, &file).map_err(|error| ArchiveError::EntryWrite {
            path: path.clone(),
            error,
        })?;
        debug!("wrote history entry {path}");

        let prune = self.prune();
        for error in &prune.errors {
            warn!("while pruning history: {}", DisplayErrorChain::new(error));
        }
        let retained = !prune.deleted.contains(&run_key);
        if retained {
            info!("archived run `{}` as {path}", report.run.id);
        } else {
            info!(
                "run `{}` is older than the {} retained runs and was not kept",
                report.run.id, self.max_runs,
            );
        }

        Ok(ArchiveOutcome {
            run_key,
            path,
            replaced,
            retained,
            prune,
        })
    }

    fn warn_on_collision(&self, path: &Utf8Path, run_key: RunKey, run: &RunRecord) {
        match read_history_entry(path, run_key) {
            Ok(existing) if existing.run.id != run.id => {
                warn!(
                    "run `{}` has the same run key ({run_key}) as archived run `{}`, \
                     replacing it",
                    run.id, existing.run.id,
                );
            }
            Ok(_) => {
                debug!("replacing history entry for run `{}`", run.id);
            }
            Err(error) => {
                debug!(
                    "replacing unreadable history entry: {}",
                    DisplayErrorChain::new(&error)
                );
            }
        }
    }

    /// Deletes the oldest entries beyond `max_runs`. Must be called with the
    /// lock held.
    fn prune(&self) -> PruneResult {
        let mut result = PruneResult::default();

        let entries = match self.list_entries() {
            Ok(entries) => entries,
            Err(error) => {
                result.errors.push(HistoryPruneError::ReadDir {
                    dir: self.dir.clone(),
                    error,
                });
                return result;
            }
        };

        for run_key in keys_to_evict(entries.keys().copied(), self.max_runs) {
            let Some(path) = entries.get(&run_key) else {
                continue;
            };
            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!("deleted history entry {path}");
                    result.deleted.push(run_key);
                }
                // Someone else deleted it first.
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    result.deleted.push(run_key);
                }
                Err(error) => {
                    result.errors.push(HistoryPruneError::DeleteEntry {
                        run_key,
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        if !result.deleted.is_empty() {
            info!("{result}");
        }
        result
    }

    /// Lists entry files by run key. Other files are ignored.
    fn list_entries(&self) -> io::Result<BTreeMap<RunKey, Utf8PathBuf>> {
        let mut entries = BTreeMap::new();
        for entry in self.dir.read_dir_utf8()? {
            let entry = entry?;
            match parse_history_entry_file_name(entry.file_name()) {
                Some(run_key) => {
                    entries.insert(run_key, entry.into_path());
                }
                None => {
                    debug!("ignoring {} in history directory", entry.file_name());
                }
            }
        }
        Ok(entries)
    }
}

impl HistorySource for HistoryArchiver {
    type Error = HistoryLoadError;

    fn load_window(&self) -> Result<HistoryWindow, Self::Error> {
        let mut window = HistoryWindow::new(self.max_runs);
        if !self.dir.is_dir() {
            debug!("history directory {} does not exist", self.dir);
            return Ok(window);
        }

        let _lock = StoreLock::acquire(&self.lock_path(), LockKind::Shared)?;
        let entries = self
            .list_entries()
            .map_err(|error| HistoryLoadError::ReadDir {
                dir: self.dir.clone(),
                error,
            })?;

        for (run_key, path) in entries {
            match read_history_entry(&path, run_key) {
                Ok(entry) => {
                    window.insert(run_key, entry);
                }
                Err(error) => {
                    warn!(
                        "skipping history entry: {}",
                        DisplayErrorChain::new(&error)
                    );
                }
            }
        }

        debug!(
            "loaded {} history entr{} from {}",
            window.len(),
            if window.len() == 1 { "y" } else { "ies" },
            self.dir,
        );
        Ok(window)
    }
}

/// The result of archiving a run.
#[derive(Debug)]
pub struct ArchiveOutcome {
    /// The run key the report was archived under.
    pub run_key: RunKey,

    /// The path of the entry file.
    pub path: Utf8PathBuf,

    /// Whether an existing entry with the same key was replaced.
    pub replaced: bool,

    /// Whether the new entry is still present after pruning.
    ///
    /// This is false if the run is older than every retained run.
    pub retained: bool,

    /// The result of pruning the directory after writing.
    pub prune: PruneResult,
}

/// The result of pruning the history directory.
#[derive(Debug, Default)]
pub struct PruneResult {
    /// Run keys whose entries were deleted, oldest first.
    pub deleted: Vec<RunKey>,

    /// Errors that occurred during pruning.
    ///
    /// Pruning continues despite individual errors, so this list may contain
    /// multiple entries.
    pub errors: Vec<HistoryPruneError>,
}

impl fmt::Display for PruneResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pruned {} history entr{}",
            self.deleted.len(),
            if self.deleted.len() == 1 { "y" } else { "ies" },
        )?;
        if !self.errors.is_empty() {
            write!(
                f,
                " ({} error{})",
                self.errors.len(),
                plural_s(self.errors.len())
            )?;
        }
        Ok(())
    }
}

/// A history entry file, as written.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFileRef<'a> {
    format_version: u32,
    run_key: RunKey,
    run: &'a RunRecord,
    tests: &'a [TestRecord],
}

/// A history entry file, as read.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryFile {
    run_key: RunKey,
    run: RunRecord,
    tests: Vec<TestRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatVersionOnly {
    format_version: u32,
}

/// Reads the history entry at `path`, which is named for `file_key`.
fn read_history_entry(path: &Utf8Path, file_key: RunKey) -> Result<HistoryEntry, HistoryReadError> {
    let contents = std::fs::read_to_string(path).map_err(|error| HistoryReadError::Read {
        path: path.to_owned(),
        error,
    })?;
    let deserialize_error = |error| HistoryReadError::Deserialize {
        path: path.to_owned(),
        error,
    };

    // Check the version first, since newer formats may not parse at all.
    let version: FormatVersionOnly = serde_json::from_str(&contents).map_err(deserialize_error)?;
    if version.format_version > HISTORY_FORMAT_VERSION {
        return Err(HistoryReadError::FormatVersionTooNew {
            path: path.to_owned(),
            file_version: version.format_version,
            max_supported_version: HISTORY_FORMAT_VERSION,
        });
    }

    let file: HistoryFile = serde_json::from_str(&contents).map_err(deserialize_error)?;
    if file.run_key != file_key {
        return Err(HistoryReadError::KeyMismatch {
            path: path.to_owned(),
            file_key,
            entry_key: file.run_key,
        });
    }

    Ok(HistoryEntry {
        run_key: file.run_key,
        run: file.run,
        tests: file.tests,
    })
}

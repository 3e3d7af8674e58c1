// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by runledger.

use camino::Utf8PathBuf;
use runledger_metadata::{RunKey, TimestampParseError};
use thiserror::Error;

/// An error that occurred while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("config file not found at `{path}`")]
    FileNotFound {
        /// The path that was looked up.
        path: Utf8PathBuf,
    },

    /// An error occurred while reading the configuration file.
    #[error("failed to read config file at `{path}`")]
    Read {
        /// The path to the configuration file.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while parsing the configuration file.
    #[error("failed to parse config file at `{path}`")]
    Parse {
        /// The path to the configuration file.
        path: Utf8PathBuf,

        /// The underlying TOML error.
        #[source]
        error: toml::de::Error,
    },
}

/// An error that occurred while reading a single shard artifact.
///
/// These errors are recoverable: the shard is skipped and merging continues.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShardReadError {
    /// The shard file could not be read.
    #[error("failed to read shard file `{path}`")]
    Read {
        /// The shard file.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The shard file is empty.
    #[error("shard file `{path}` is empty")]
    Empty {
        /// The shard file.
        path: Utf8PathBuf,
    },

    /// The shard file is not valid JSON, or has fields of the wrong type.
    #[error("failed to deserialize shard file `{path}`")]
    Deserialize {
        /// The shard file.
        path: Utf8PathBuf,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// A required field is missing from the shard file.
    #[error("shard file `{path}` is missing required field `{field}`")]
    MissingField {
        /// The shard file.
        path: Utf8PathBuf,

        /// The dotted path of the missing field.
        field: &'static str,
    },
}

/// An error that occurred while merging the shards of a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShardMergeError {
    /// The run directory could not be listed.
    #[error("failed to read run directory `{dir}`")]
    ReadRunDir {
        /// The run directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// No valid shard artifacts were found, so there was nothing to merge.
    #[error(
        "no valid shard files found in `{dir}` ({candidates} candidates, {skipped} skipped)"
    )]
    NoValidShards {
        /// The run directory.
        dir: Utf8PathBuf,

        /// The number of files that matched the shard naming convention.
        candidates: usize,

        /// The number of candidates that were skipped as invalid.
        skipped: usize,
    },

    /// The canonical report could not be written.
    #[error("failed to write canonical report to `{path}`")]
    ReportWrite {
        /// The canonical report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while reading an existing canonical report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportReadError {
    /// The report could not be read.
    #[error("failed to read report `{path}`")]
    Read {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The report could not be deserialized.
    #[error("failed to deserialize report `{path}`")]
    Deserialize {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while deriving a [`RunKey`] for a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunKeyError {
    /// The run has no timestamp.
    #[error("run `{run_id}` has no timestamp, so it cannot be ordered in history")]
    MissingTimestamp {
        /// The ID of the run.
        run_id: String,
    },

    /// The run's timestamp could not be parsed.
    #[error("run `{run_id}` has an unparseable timestamp")]
    InvalidTimestamp {
        /// The ID of the run.
        run_id: String,

        /// The parse error.
        #[source]
        error: TimestampParseError,
    },
}

/// An error that occurred while acquiring a store lock.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FileLockError {
    /// The lock file could not be opened.
    #[error("failed to open lock file `{path}`")]
    Open {
        /// The lock file.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// Locking failed, for example because the filesystem does not support it.
    #[error("failed to lock `{path}`")]
    Lock {
        /// The lock file.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The lock was held by another process for too long.
    #[error("timed out after {timeout_secs}s waiting for lock on `{path}`")]
    Timeout {
        /// The lock file.
        path: Utf8PathBuf,

        /// How long we waited.
        timeout_secs: u64,
    },
}

/// An error that occurred while archiving a run into the history directory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// The run has no usable ordering key.
    #[error("cannot archive run")]
    RunKey(#[from] RunKeyError),

    /// The history directory could not be created.
    #[error("failed to create history directory `{dir}`")]
    DirCreate {
        /// The history directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The history directory could not be locked.
    #[error("failed to lock history directory")]
    Lock(#[from] FileLockError),

    /// The history directory could not be listed.
    #[error("failed to read history directory `{dir}`")]
    ReadDir {
        /// The history directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The history entry could not be written.
    #[error("failed to write history entry `{path}`")]
    EntryWrite {
        /// The history entry path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while loading the retained window from the history
/// directory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryLoadError {
    /// The history directory could not be locked.
    #[error("failed to lock history directory")]
    Lock(#[from] FileLockError),

    /// The history directory could not be listed.
    #[error("failed to read history directory `{dir}`")]
    ReadDir {
        /// The history directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while reading a single history entry.
///
/// These errors are recoverable: the entry is treated as absent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryReadError {
    /// The entry could not be read.
    #[error("failed to read history entry `{path}`")]
    Read {
        /// The history entry path.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The entry could not be deserialized.
    #[error("failed to deserialize history entry `{path}`")]
    Deserialize {
        /// The history entry path.
        path: Utf8PathBuf,

        /// The underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// The entry was written by a newer format than this version understands.
    #[error(
        "history entry `{path}` has format version {file_version}, \
         newer than the supported version {max_supported_version}"
    )]
    FormatVersionTooNew {
        /// The history entry path.
        path: Utf8PathBuf,

        /// The format version in the file.
        file_version: u32,

        /// The maximum supported format version.
        max_supported_version: u32,
    },

    /// The key in the file name does not match the key inside the entry.
    #[error("history entry `{path}` is named for run key {file_key} but contains {entry_key}")]
    KeyMismatch {
        /// The history entry path.
        path: Utf8PathBuf,

        /// The key parsed from the file name.
        file_key: RunKey,

        /// The key stored in the entry.
        entry_key: RunKey,
    },
}

/// An error that occurred while pruning history.
///
/// Pruning continues despite these errors; they are reported as warnings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryPruneError {
    /// The history directory could not be enumerated after writing.
    #[error("failed to read history directory `{dir}`")]
    ReadDir {
        /// The history directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// A history entry could not be deleted.
    #[error("failed to delete history entry for run key {run_key} at `{path}`")]
    DeleteEntry {
        /// The run key of the entry.
        run_key: RunKey,

        /// The history entry path.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while recording a run into the trend workbook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkbookError {
    /// The run has no usable ordering key.
    #[error("cannot record run in workbook")]
    RunKey(#[from] RunKeyError),

    /// The directory containing the workbook could not be created.
    #[error("failed to create workbook directory `{dir}`")]
    DirCreate {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The workbook could not be locked.
    #[error("failed to lock workbook")]
    Lock(#[from] FileLockError),

    /// The workbook could not be encoded.
    #[error("failed to encode workbook `{path}`")]
    Encode {
        /// The workbook path.
        path: Utf8PathBuf,

        /// The underlying encoder error.
        #[source]
        error: rust_xlsxwriter::XlsxError,
    },

    /// The workbook could not be written.
    #[error("failed to write workbook `{path}`")]
    Write {
        /// The workbook path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while reading an existing workbook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkbookReadError {
    /// The workbook file could not be read.
    #[error("failed to read workbook `{path}`")]
    Read {
        /// The workbook path.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The file is not a readable workbook.
    #[error("failed to open workbook `{path}`")]
    Open {
        /// The workbook path.
        path: Utf8PathBuf,

        /// The underlying spreadsheet error.
        #[source]
        error: calamine::XlsxError,
    },

    /// One sheet in the workbook could not be read.
    #[error("failed to read sheet `{sheet}` in workbook `{path}`")]
    Sheet {
        /// The workbook path.
        path: Utf8PathBuf,

        /// The sheet name.
        sheet: String,

        /// The underlying spreadsheet error.
        #[source]
        error: calamine::XlsxError,
    },
}

/// An error that stopped the report pipeline before any store was updated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The run's shards could not be merged.
    #[error("failed to merge shards")]
    Merge(#[from] ShardMergeError),

    /// The run directory has no shards, and its existing report could not be
    /// read.
    #[error("run directory has no shard files")]
    ReadReport(#[from] ReportReadError),
}

/// Displays an error along with its chain of sources, on one line.
///
/// Used when an error is logged rather than returned.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> std::fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The trend workbook.
//!
//! The workbook holds an `overview` sheet with one row per retained run, and
//! one `run_<runKey>` sheet per retained run listing its tests. Sheets with
//! any other name are carried over untouched.
//!
//! The whole workbook is rewritten on every update, under an advisory lock
//! on a `.lock` file next to it.

mod model;
mod tables;
mod xlsx;

pub use tables::{OVERVIEW_SHEET_NAME, RUN_SHEET_PREFIX, parse_run_sheet_name, run_sheet_name};

use self::{
    model::{Sheet, WorkbookModel},
    tables::{encode_overview, encode_run_sheet, parse_overview, parse_run_sheet},
    xlsx::{decode_workbook, encode_workbook},
};
use super::{HistorySource, HistoryWindow, keys_to_evict, resolve_run_key};
use crate::{
    errors::{DisplayErrorChain, WorkbookError, WorkbookReadError},
    helpers::{LockKind, StoreLock, plural_s, write_bytes_atomic},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use runledger_metadata::{HistoryEntry, RunKey, RunRecord, RunReport};
use std::{collections::BTreeMap, io, num::NonZero};
use tracing::{debug, info, warn};

/// The default file name of the trend workbook within the output directory.
pub const DEFAULT_WORKBOOK_FILE_NAME: &str = "trend.xlsx";

/// Records run reports into a bounded trend workbook.
#[derive(Clone, Debug)]
pub struct TrendWorkbook {
    path: Utf8PathBuf,
    max_runs: NonZero<usize>,
}

impl TrendWorkbook {
    /// Creates a store for the default workbook within `output_dir`.
    pub fn new(output_dir: &Utf8Path, max_runs: NonZero<usize>) -> Self {
        Self::with_path(output_dir.join(DEFAULT_WORKBOOK_FILE_NAME), max_runs)
    }

    /// Creates a store for the workbook at `path`.
    pub fn with_path(path: impl Into<Utf8PathBuf>, max_runs: NonZero<usize>) -> Self {
        Self {
            path: path.into(),
            max_runs,
        }
    }

    /// Returns the workbook path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the maximum number of runs retained.
    pub fn max_runs(&self) -> NonZero<usize> {
        self.max_runs
    }

    fn lock_path(&self) -> Utf8PathBuf {
        let mut lock_path = self.path.clone().into_string();
        lock_path.push_str(".lock");
        lock_path.into()
    }

    /// Records a run report, then evicts the oldest runs beyond `max_runs`.
    ///
    /// A run with the same run key as an existing row replaces it. An
    /// existing workbook that cannot be read or opened is replaced by a fresh
    /// one.
    pub fn record(&self, report: &RunReport) -> Result<WorkbookOutcome, WorkbookError> {
        let run_key = resolve_run_key(&report.run)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| WorkbookError::DirCreate {
                dir: parent.to_owned(),
                error,
            })?;
        }
        let _lock = StoreLock::acquire(&self.lock_path(), LockKind::Exclusive)?;

        let mut contents = self.read_contents();

        let previous = contents.overview.insert(run_key, report.run.clone());
        let replaced = previous.is_some();
        if let Some(previous) = &previous
            && previous.id != report.run.id
        {
            warn!(
                "run `{}` has the same run key ({run_key}) as recorded run `{}`, replacing it",
                report.run.id, previous.id,
            );
        }
        let evicted_rows = keys_to_evict(contents.overview.keys().copied(), self.max_runs);
        for run_key in &evicted_rows {
            contents.overview.remove(run_key);
        }

        contents
            .run_sheets
            .insert(run_key, encode_run_sheet(&report.tests));
        let evicted_sheets = keys_to_evict(contents.run_sheets.keys().copied(), self.max_runs);
        for run_key in &evicted_sheets {
            contents.run_sheets.remove(run_key);
        }

        let bytes = encode_workbook(&contents.into_model()).map_err(|error| {
            WorkbookError::Encode {
                path: self.path.clone(),
                error,
            }
        })?;
        write_bytes_atomic(&self.path, &bytes).map_err(|error| WorkbookError::Write {
            path: self.path.clone(),
            error,
        })?;

        let retained = !evicted_rows.contains(&run_key);
        if !evicted_rows.is_empty() {
            info!(
                "evicted {} run{} from {}",
                evicted_rows.len(),
                plural_s(evicted_rows.len()),
                self.path,
            );
        }
        info!("recorded run `{}` in {}", report.run.id, self.path);

        Ok(WorkbookOutcome {
            run_key,
            path: self.path.clone(),
            replaced,
            retained,
            evicted_rows,
            evicted_sheets,
        })
    }

    /// Reads the workbook, tolerating damage. Must be called with the lock
    /// held.
    ///
    /// Anything short of a readable workbook yields empty contents.
    fn read_contents(&self) -> WorkbookContents {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("workbook {} does not exist, starting fresh", self.path);
                return WorkbookContents::default();
            }
            Err(error) => {
                let error = WorkbookReadError::Read {
                    path: self.path.clone(),
                    error,
                };
                warn!(
                    "starting a fresh workbook: {}",
                    DisplayErrorChain::new(&error)
                );
                return WorkbookContents::default();
            }
        };

        match decode_workbook(&self.path, bytes) {
            Ok(read) => {
                for error in &read.failed_sheets {
                    warn!("dropping sheet: {}", DisplayErrorChain::new(error));
                }
                WorkbookContents::from_model(read.model)
            }
            Err(error) => {
                warn!(
                    "starting a fresh workbook: {}",
                    DisplayErrorChain::new(&error)
                );
                WorkbookContents::default()
            }
        }
    }
}

impl HistorySource for TrendWorkbook {
    type Error = WorkbookError;

    /// Loads the retained runs by joining overview rows with their run sheets.
    ///
    /// A row without a run sheet yields an entry with no tests. Run sheets
    /// without a row are ignored.
    fn load_window(&self) -> Result<HistoryWindow, Self::Error> {
        let mut window = HistoryWindow::new(self.max_runs);
        if !self.path.exists() {
            debug!("workbook {} does not exist", self.path);
            return Ok(window);
        }

        let _lock = StoreLock::acquire(&self.lock_path(), LockKind::Shared)?;
        let mut contents = self.read_contents();

        for (run_key, run) in contents.overview {
            let tests = match contents.run_sheets.remove(&run_key) {
                Some(sheet) => parse_run_sheet(&sheet),
                None => {
                    debug!("run {run_key} has no sheet in {}", self.path);
                    Vec::new()
                }
            };
            window.insert(run_key, HistoryEntry { run_key, run, tests });
        }
        Ok(window)
    }
}

/// The result of recording a run in the workbook.
#[derive(Debug)]
pub struct WorkbookOutcome {
    /// The run key the report was recorded under.
    pub run_key: RunKey,

    /// The workbook path.
    pub path: Utf8PathBuf,

    /// Whether an existing overview row with the same key was replaced.
    pub replaced: bool,

    /// Whether the new run is still present after eviction.
    pub retained: bool,

    /// Run keys whose overview rows were evicted, oldest first.
    pub evicted_rows: Vec<RunKey>,

    /// Run keys whose run sheets were evicted, oldest first.
    pub evicted_sheets: Vec<RunKey>,
}

/// The workbook, split into the parts this store manages.
#[derive(Debug, Default)]
struct WorkbookContents {
    overview: BTreeMap<RunKey, RunRecord>,
    run_sheets: BTreeMap<RunKey, Sheet>,
    other_sheets: IndexMap<String, Sheet>,
}

impl WorkbookContents {
    fn from_model(model: WorkbookModel) -> Self {
        let mut contents = Self::default();
        for (name, sheet) in model.sheets {
            if name == OVERVIEW_SHEET_NAME {
                contents.overview = parse_overview(&sheet);
            } else if let Some(run_key) = parse_run_sheet_name(&name) {
                contents.run_sheets.insert(run_key, sheet);
            } else {
                contents.other_sheets.insert(name, sheet);
            }
        }
        contents
    }

    /// Lays out the workbook: overview, then run sheets oldest first, then
    /// any other sheets in their original order.
    fn into_model(self) -> WorkbookModel {
        let mut model = WorkbookModel::default();
        model
            .sheets
            .insert(OVERVIEW_SHEET_NAME.to_owned(), encode_overview(&self.overview));
        for (run_key, sheet) in self.run_sheets {
            model.sheets.insert(run_sheet_name(run_key), sheet);
        }
        model.sheets.extend(self.other_sheets);
        model
    }
}

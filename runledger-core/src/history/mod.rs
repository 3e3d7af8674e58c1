// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded run history.
//!
//! Completed runs are kept in two independent stores, each retaining at most
//! `K` runs ordered by [`RunKey`]:
//!
//! * [`HistoryArchiver`]: one JSON file per run in a `history` directory.
//! * [`TrendWorkbook`]: a spreadsheet workbook with an overview sheet and one
//!   sheet per run.
//!
//! Both stores implement [`HistorySource`], and [`assemble_trends`] turns the
//! window either of them returns into trend series.

mod archive;
mod trend;
mod window;
mod workbook;

pub use archive::*;
pub use trend::*;
pub use window::*;
pub use workbook::*;

use crate::errors::RunKeyError;
use runledger_metadata::{RunKey, RunRecord};

/// A store that can produce the window of runs it currently retains.
pub trait HistorySource {
    /// The error returned when the store cannot be read at all.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the retained runs, oldest first.
    ///
    /// Individual entries that cannot be read are skipped with a warning.
    fn load_window(&self) -> Result<HistoryWindow, Self::Error>;
}

/// Derives the history key for a run from its timestamp.
pub fn resolve_run_key(run: &RunRecord) -> Result<RunKey, RunKeyError> {
    match run.resolve_timestamp() {
        Some(Ok(timestamp)) => Ok(RunKey::from_datetime(&timestamp)),
        Some(Err(error)) => Err(RunKeyError::InvalidTimestamp {
            run_id: run.id.clone(),
            error,
        }),
        None => Err(RunKeyError::MissingTimestamp {
            run_id: run.id.clone(),
        }),
    }
}

/// Parses a run key embedded in a store name.
///
/// Only the form produced by formatting a key is accepted, so `+100` and
/// `0100` are rejected rather than aliasing `100`.
fn parse_canonical_run_key(s: &str) -> Option<RunKey> {
    let run_key: RunKey = s.parse().ok()?;
    (run_key.to_string() == s).then_some(run_key)
}

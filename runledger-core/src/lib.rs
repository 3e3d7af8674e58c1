// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Shard merging and bounded run history for test result reports.
//!
//! The flow of a single run through this crate is:
//!
//! 1. [`merge`] folds the per-shard result files of a run directory into one
//!    canonical report.
//! 2. [`history::HistoryArchiver`] stores the report as one JSON file per
//!    run, keeping at most `K` runs.
//! 3. [`history::TrendWorkbook`] records the same run into a spreadsheet
//!    workbook, also bounded to `K` runs.
//! 4. [`history::assemble_trends`] turns either store's retained window into
//!    per-test and per-run trend series.
//!
//! [`pipeline::ReportPipeline`] drives steps 1 through 3.

pub mod config;
pub mod errors;
mod helpers;
pub mod history;
pub mod merge;
pub mod pipeline;
#[cfg(test)]
mod test_helpers;

use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};

/// The kind of [`RunUuid`].
pub enum RunKind {}

impl TypedUuidKind for RunKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("run");
        TAG
    }
}

/// A unique identifier minted for a merged run when shards disagree on its ID.
pub type RunUuid = TypedUuid<RunKind>;

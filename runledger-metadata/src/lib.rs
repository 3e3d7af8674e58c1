// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data contracts for runledger.
//!
//! These types describe the artifacts exchanged with the outside world:
//!
//! * shard result files written by each test worker,
//! * the canonical run report produced by merging those shards,
//! * history entries retained for trend analysis.
//!
//! Field names are serialized in camelCase to match what test-execution
//! engines emit.

mod errors;
mod report;
mod run;
mod test_record;

pub use errors::*;
pub use report::*;
pub use run::*;
pub use test_record::*;

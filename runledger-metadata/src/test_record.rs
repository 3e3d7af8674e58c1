// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::run::deserialize_millis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The separator between segments of a hierarchical test name.
pub const TEST_NAME_SEPARATOR: &str = " > ";

/// The outcome of one individual test within a run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    /// The hierarchical identity of the test: the suite path followed by the
    /// test title, joined by [`TEST_NAME_SEPARATOR`].
    ///
    /// Two records with the same name in different runs are the same test.
    pub name: String,

    /// The status of the test.
    #[serde(default)]
    pub status: TestStatus,

    /// Elapsed time, in milliseconds.
    #[serde(default, deserialize_with = "deserialize_millis")]
    pub duration: u64,

    /// The index of the shard or worker that ran the test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<u32>,
}

impl TestRecord {
    /// Returns the last segment of the test's name.
    pub fn title(&self) -> &str {
        test_title(&self.name)
    }
}

/// Returns the last segment of a hierarchical test name.
pub fn test_title(name: &str) -> &str {
    name.rsplit(TEST_NAME_SEPARATOR).next().unwrap_or(name)
}

/// The status of a test.
///
/// Deserialization is lenient: unrecognized statuses become
/// [`TestStatus::Unknown`] rather than failing the whole artifact.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum TestStatus {
    /// The test passed.
    Passed,

    /// The test failed, timed out or was interrupted.
    Failed,

    /// The test was skipped.
    Skipped,

    /// The status is not known.
    #[default]
    Unknown,
}

impl TestStatus {
    /// Returns the serialized form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a status the way producers write it.
    pub fn from_producer_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" | "expected" => Self::Passed,
            "failed" | "fail" | "timedout" | "interrupted" | "unexpected" => Self::Failed,
            "skipped" | "skip" | "pending" => Self::Skipped,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for TestStatus {
    fn from(s: String) -> Self {
        Self::from_producer_str(&s)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

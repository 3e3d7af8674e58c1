// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RunKey, RunRecord, TestRecord};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The current format version of the canonical run report.
pub const REPORT_FORMAT_VERSION: u32 = 1;

/// A run record together with its individual test outcomes.
///
/// This is the shape of both the per-shard result artifacts and the canonical
/// run report. Only the canonical report carries [`ReportMetadata`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// The run-level summary.
    pub run: RunRecord,

    /// The individual test outcomes. Order is not significant.
    pub tests: Vec<TestRecord>,

    /// Metadata about how this report was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
}

/// Metadata describing how a canonical run report was produced.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<FixedOffset>,

    /// The format version of the report.
    pub format_version: u32,

    /// The number of shard artifacts that were merged.
    pub shard_count: usize,

    /// File names of shard artifacts that were skipped because they were
    /// unreadable or structurally invalid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_shards: Vec<String>,

    /// The number of tests run by each worker.
    ///
    /// Tests without a worker ID are not counted.
    #[serde(default)]
    pub worker_distribution: BTreeMap<u32, usize>,
}

/// One retained run in history.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// The key of this entry, derived from the run's timestamp.
    pub run_key: RunKey,

    /// The run-level summary.
    pub run: RunRecord,

    /// The individual test outcomes for the run.
    pub tests: Vec<TestRecord>,
}

impl HistoryEntry {
    /// Creates a history entry for a report under the given key.
    pub fn from_report(run_key: RunKey, report: &RunReport) -> Self {
        Self {
            run_key,
            run: report.run.clone(),
            tests: report.tests.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunTimestamp, TestStatus};
    use pretty_assertions::assert_eq;

    #[test]
    fn shard_shaped_report_without_metadata() {
        let json = r#"{
            "run": {
                "id": "shard-1",
                "timestamp": "2024-01-01T00:00:00Z",
                "totalTests": 1,
                "passed": 1,
                "failed": 0,
                "skipped": 0,
                "duration": 10
            },
            "tests": [
                {"name": "a > b", "status": "passed", "duration": 10, "workerId": 1}
            ]
        }"#;
        let report: RunReport = serde_json::from_str(json).expect("valid report");
        assert_eq!(report.metadata, None);
        assert_eq!(
            report.run.timestamp,
            Some(RunTimestamp::Text("2024-01-01T00:00:00Z".to_owned()))
        );
        assert_eq!(report.tests[0].status, TestStatus::Passed);
        assert_eq!(report.tests[0].worker_id, Some(1));
    }

    #[test]
    fn worker_distribution_keys_round_trip() {
        let metadata = ReportMetadata {
            generated_at: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .expect("valid timestamp"),
            format_version: REPORT_FORMAT_VERSION,
            shard_count: 2,
            skipped_shards: vec!["shard-3.json".to_owned()],
            worker_distribution: BTreeMap::from([(0, 3), (1, 2)]),
        };
        let text = serde_json::to_string(&metadata).expect("serializes");
        assert!(text.contains(r#""workerDistribution":{"0":3,"1":2}"#));
        let again: ReportMetadata = serde_json::from_str(&text).expect("deserializes");
        assert_eq!(metadata, again);
    }
}

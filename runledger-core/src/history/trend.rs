// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trend series assembled from a history window.

use super::HistoryWindow;
use indexmap::IndexMap;
use runledger_metadata::{RunKey, RunTimestamp, TestRecord, TestStatus, test_title};
use serde::Serialize;
use std::collections::HashSet;

/// Trend series for every run and every test in a history window.
///
/// This is the input to an external renderer, so it serializes to JSON.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    /// One point per retained run, oldest first.
    pub runs: Vec<RunTrendPoint>,

    /// One series per distinct test name, in the order tests were first seen.
    pub tests: Vec<TestTrend>,
}

impl TrendReport {
    /// Returns the trend for the test with the given name.
    pub fn test(&self, name: &str) -> Option<&TestTrend> {
        self.tests.iter().find(|trend| trend.name == name)
    }
}

/// Run-level counters for one run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrendPoint {
    /// The run's key.
    pub run_key: RunKey,

    /// The run's ID.
    pub id: String,

    /// The run's timestamp, as recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RunTimestamp>,

    /// The number of tests in the run.
    pub total_tests: u64,

    /// The number of tests that passed.
    pub passed: u64,

    /// The number of tests that failed.
    pub failed: u64,

    /// The number of tests that were skipped.
    pub skipped: u64,

    /// Total elapsed time, in milliseconds.
    pub duration: u64,
}

/// The history of a single test across retained runs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTrend {
    /// The test's full hierarchical name.
    pub name: String,

    /// The last segment of the name.
    pub title: String,

    /// One point per run that contains the test, oldest first.
    pub series: Vec<TestTrendPoint>,

    /// Counts of each outcome across the series.
    pub tally: OutcomeTally,

    /// The status in the newest run that contains the test.
    pub latest_status: TestStatus,
}

/// The outcome of one test in one run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTrendPoint {
    /// The run's key.
    pub run_key: RunKey,

    /// The test's status in that run.
    pub status: TestStatus,

    /// The test's duration in that run, in milliseconds.
    pub duration: u64,

    /// The run's timestamp, as recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RunTimestamp>,
}

/// Counts of test outcomes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OutcomeTally {
    /// Runs in which the test passed.
    pub passed: usize,
    /// Runs in which the test failed.
    pub failed: usize,
    /// Runs in which the test was skipped.
    pub skipped: usize,
    /// Runs in which the test's status was not known.
    pub unknown: usize,
}

impl OutcomeTally {
    fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Unknown => self.unknown += 1,
        }
    }
}

/// Assembles trend series from a history window.
///
/// A test's series only has points for the runs that contain it. If a run
/// lists the same test name more than once, the first record is used.
pub fn assemble_trends(window: &HistoryWindow) -> TrendReport {
    let mut runs = Vec::with_capacity(window.len());
    let mut tests: IndexMap<&str, TestTrend> = IndexMap::new();

    for (run_key, entry) in window.iter() {
        let run = &entry.run;
        runs.push(RunTrendPoint {
            run_key,
            id: run.id.clone(),
            timestamp: run.timestamp.clone(),
            total_tests: run.total_tests,
            passed: run.passed,
            failed: run.failed,
            skipped: run.skipped,
            duration: run.duration,
        });

        let mut seen_in_run = HashSet::new();
        for test in &entry.tests {
            if !seen_in_run.insert(test.name.as_str()) {
                continue;
            }
            let trend = tests
                .entry(test.name.as_str())
                .or_insert_with(|| new_trend(test));
            trend.series.push(TestTrendPoint {
                run_key,
                status: test.status,
                duration: test.duration,
                timestamp: run.timestamp.clone(),
            });
            trend.tally.record(test.status);
            trend.latest_status = test.status;
        }
    }

    TrendReport {
        runs,
        tests: tests.into_values().collect(),
    }
}

fn new_trend(test: &TestRecord) -> TestTrend {
    TestTrend {
        name: test.name.clone(),
        title: test_title(&test.name).to_owned(),
        series: Vec::new(),
        tally: OutcomeTally::default(),
        latest_status: test.status,
    }
}

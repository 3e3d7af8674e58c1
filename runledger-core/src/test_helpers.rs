// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures and strategies for unit tests.

use crate::history::HistoryWindow;
use camino::Utf8Path;
use proptest::{array, collection::vec, option, prelude::*};
use runledger_metadata::{
    HistoryEntry, RunKey, RunRecord, RunReport, RunTimestamp, TestRecord, TestStatus,
};
use serde::Serialize;
use std::num::NonZero;

pub(crate) fn nz(n: usize) -> NonZero<usize> {
    NonZero::new(n).expect("non-zero capacity")
}

pub(crate) fn make_test(name: &str, status: TestStatus, duration: u64) -> TestRecord {
    TestRecord {
        name: name.to_owned(),
        status,
        duration,
        worker_id: None,
    }
}

/// Builds a report whose counters agree with `tests`, started at `key_secs`.
pub(crate) fn make_report(id: &str, key_secs: i64, tests: Vec<TestRecord>) -> RunReport {
    let count = |status| tests.iter().filter(|test| test.status == status).count() as u64;
    RunReport {
        run: RunRecord {
            id: id.to_owned(),
            timestamp: Some(RunTimestamp::EpochMillis(key_secs * 1000)),
            total_tests: tests.len() as u64,
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            duration: tests.iter().map(|test| test.duration).sum(),
            environment: None,
        },
        tests,
        metadata: None,
    }
}

pub(crate) fn make_entry(id: &str, key_secs: i64, tests: Vec<TestRecord>) -> HistoryEntry {
    HistoryEntry::from_report(RunKey::new(key_secs), &make_report(id, key_secs, tests))
}

pub(crate) fn make_window(capacity: usize, entries: Vec<HistoryEntry>) -> HistoryWindow {
    let mut window = HistoryWindow::new(nz(capacity));
    for entry in entries {
        window.insert(entry.run_key, entry);
    }
    window
}

pub(crate) fn write_json<T: Serialize>(path: &Utf8Path, value: &T) {
    let contents = serde_json::to_string_pretty(value).expect("value serializes");
    std::fs::write(path, contents).expect("wrote JSON file");
}

pub(crate) fn arb_status() -> impl Strategy<Value = TestStatus> {
    prop_oneof![
        Just(TestStatus::Passed),
        Just(TestStatus::Failed),
        Just(TestStatus::Skipped),
        Just(TestStatus::Unknown),
    ]
}

pub(crate) fn arb_test_record() -> impl Strategy<Value = TestRecord> {
    (
        "[a-c]{1,2}( > [a-d]{1,3}){0,2}",
        arb_status(),
        0..10_000u64,
        option::of(0..4u32),
    )
        .prop_map(|(name, status, duration, worker_id)| TestRecord {
            name,
            status,
            duration,
            worker_id,
        })
}

pub(crate) fn arb_shard() -> impl Strategy<Value = RunReport> {
    (
        "[a-z]{0,3}",
        option::of(1_600_000_000_000..1_800_000_000_000i64),
        array::uniform4(0..1000u64),
        0..100_000u64,
        option::of("[a-z]{1,4}"),
        vec(arb_test_record(), 0..8),
    )
        .prop_map(|(id, timestamp, counts, duration, host, tests)| {
            let [total_tests, passed, failed, skipped] = counts;
            RunReport {
                run: RunRecord {
                    id,
                    timestamp: timestamp.map(RunTimestamp::EpochMillis),
                    total_tests,
                    passed,
                    failed,
                    skipped,
                    duration,
                    environment: host.map(|host| serde_json::json!({ "host": host })),
                },
                tests,
                metadata: None,
            }
        })
}

/// A set of shards along with a permutation of the same set.
pub(crate) fn arb_shard_set() -> impl Strategy<Value = (Vec<RunReport>, Vec<RunReport>)> {
    vec(arb_shard(), 1..6).prop_flat_map(|shards| (Just(shards.clone()), Just(shards).prop_shuffle()))
}

/// A sequence of runs with arbitrary (possibly repeated) keys.
pub(crate) fn arb_entries() -> impl Strategy<Value = Vec<HistoryEntry>> {
    vec(
        (
            "[a-z]{1,6}",
            1_700_000_000..1_700_000_040i64,
            vec(arb_test_record(), 0..6),
        ),
        0..30,
    )
    .prop_map(|runs| {
        runs.into_iter()
            .map(|(id, key, tests)| make_entry(&id, key, tests))
            .collect()
    })
}

// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trends assembled from a store read back from disk match trends assembled
//! from the in-memory window that was written.

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use proptest::{collection::vec, prelude::*};
use runledger_core::history::{
    HistoryArchiver, HistorySource, HistoryWindow, TrendWorkbook, assemble_trends,
    resolve_run_key,
};
use runledger_metadata::{HistoryEntry, RunReport, TestStatus};
use std::num::NonZero;
use test_strategy::proptest;

fn arb_status() -> impl Strategy<Value = TestStatus> {
    prop_oneof![
        Just(TestStatus::Passed),
        Just(TestStatus::Failed),
        Just(TestStatus::Skipped),
        Just(TestStatus::Unknown),
    ]
}

/// Runs with offsets in a narrow range, so that keys repeat.
fn arb_runs() -> impl Strategy<Value = Vec<RunReport>> {
    vec(
        (
            "[a-z]{1,5}",
            0..12i64,
            vec(("[a-c]( > [a-c]){0,2}", arb_status(), 0..5000u64), 0..5),
        ),
        1..10,
    )
    .prop_map(|runs| {
        runs.into_iter()
            .map(|(id, offset, tests)| {
                let tests = tests
                    .into_iter()
                    .map(|(name, status, duration)| test_record(&name, status, duration))
                    .collect();
                report(&id, offset, tests)
            })
            .collect()
    })
}

#[proptest(cases = 16)]
fn stores_round_trip_trends(
    #[strategy(arb_runs())] runs: Vec<RunReport>,
    #[strategy(1..5usize)] max_runs: usize,
) {
    test_init();
    let max_runs = NonZero::new(max_runs).expect("strategy yields non-zero");
    let dir = Utf8TempDir::new().expect("created temp dir");
    let archiver = HistoryArchiver::new(dir.path(), max_runs);
    let workbook = TrendWorkbook::new(dir.path(), max_runs);

    let mut expected = HistoryWindow::new(max_runs);
    for run in &runs {
        let run_key = resolve_run_key(&run.run).expect("run has a timestamp");
        expected.insert(run_key, HistoryEntry::from_report(run_key, run));

        archiver.archive(run).expect("archive succeeds");
        workbook.record(run).expect("record succeeds");
    }

    let from_history = archiver.load_window().expect("history loads");
    let from_workbook = workbook.load_window().expect("workbook loads");
    prop_assert!(from_history.len() <= max_runs.get());
    prop_assert!(from_workbook.len() <= max_runs.get());
    prop_assert_eq!(&from_history, &expected);

    let expected_trends = assemble_trends(&expected);
    prop_assert_eq!(&assemble_trends(&from_history), &expected_trends);
    prop_assert_eq!(&assemble_trends(&from_workbook), &expected_trends);
}

// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use color_eyre::eyre::Result;
use runledger_core::config::{LedgerConfig, StoreConfig};
use runledger_metadata::{RunRecord, RunReport, RunTimestamp, TestRecord, TestStatus};
use std::{num::NonZero, sync::Once};

pub(crate) const BASE: i64 = 1_700_000_000;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = color_eyre::install();
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub(crate) fn config(max_runs: usize) -> LedgerConfig {
    let max_runs = NonZero::new(max_runs).expect("max runs is non-zero");
    LedgerConfig {
        history: StoreConfig {
            enabled: true,
            max_runs,
        },
        workbook: StoreConfig {
            enabled: true,
            max_runs,
        },
    }
}

pub(crate) fn test_record(name: &str, status: TestStatus, duration: u64) -> TestRecord {
    TestRecord {
        name: name.to_owned(),
        status,
        duration,
        worker_id: None,
    }
}

/// A report for a run started `offset_secs` after [`BASE`].
pub(crate) fn report(id: &str, offset_secs: i64, tests: Vec<TestRecord>) -> RunReport {
    let count = |status| tests.iter().filter(|test| test.status == status).count() as u64;
    RunReport {
        run: RunRecord {
            id: id.to_owned(),
            timestamp: Some(RunTimestamp::EpochMillis((BASE + offset_secs) * 1000)),
            total_tests: tests.len() as u64,
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            duration: tests.iter().map(|test| test.duration).sum(),
            environment: Some(serde_json::json!({ "os": "linux", "ci": true })),
        },
        tests,
        metadata: None,
    }
}

pub(crate) fn write_shard(dir: &Utf8Path, suffix: &str, shard: &RunReport) -> Result<()> {
    let path = dir.join(format!("shard-{suffix}.json"));
    std::fs::write(path, serde_json::to_vec_pretty(shard)?)?;
    Ok(())
}

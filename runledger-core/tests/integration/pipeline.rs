// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, bail, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use runledger_core::{
    config::{ConfigLocation, LedgerConfig},
    history::{HistorySource, assemble_trends, history_entry_file_name},
    merge::{CANONICAL_REPORT_FILE_NAME, MergeOptions, read_run_report},
    pipeline::{ReportPipeline, ReportSource},
};
use runledger_metadata::{RunKey, TestStatus};

#[test]
fn sixteen_sharded_runs_keep_fifteen() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;

    for i in 0..16 {
        let offset = i * 3600;
        let status = if i % 4 == 0 {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        write_shard(
            dir.path(),
            "1",
            &report(
                "",
                offset,
                vec![
                    test_record("api > login", status, 100 + i as u64),
                    test_record("api > logout", TestStatus::Passed, 20),
                ],
            ),
        )?;
        write_shard(
            dir.path(),
            "2",
            &report(
                "",
                offset + 5,
                vec![test_record("ui > renders", TestStatus::Skipped, 0)],
            ),
        )?;

        let outcome = ReportPipeline::new(config(15), dir.path())
            .with_merge_options(MergeOptions {
                run_id: Some(format!("run-{i}")),
                generated_at: None,
            })
            .run()?;
        ensure!(outcome.is_success(), "run {i} updated both stores");

        let ReportSource::Merged { merged_shards, .. } = &outcome.source else {
            bail!("run {i} was not merged from shards");
        };
        assert_eq!(merged_shards, &vec!["shard-1.json", "shard-2.json"]);
        assert_eq!(outcome.report.run.total_tests, 3);
    }

    let pipeline = ReportPipeline::new(config(15), dir.path());
    let archiver = pipeline.archiver();
    let workbook = pipeline.workbook();

    let first_key = RunKey::new(BASE + 5);
    ensure!(
        !archiver
            .dir()
            .join(history_entry_file_name(first_key))
            .exists(),
        "first run's history entry was deleted"
    );

    let expected_keys: Vec<_> = (1..16).map(|i| RunKey::new(BASE + i * 3600 + 5)).collect();
    let from_history = archiver.load_window()?;
    let from_workbook = workbook.load_window()?;
    assert_eq!(from_history.keys().collect::<Vec<_>>(), expected_keys);
    assert_eq!(from_workbook.keys().collect::<Vec<_>>(), expected_keys);

    let history_trends = assemble_trends(&from_history);
    let workbook_trends = assemble_trends(&from_workbook);
    assert_eq!(history_trends, workbook_trends);

    let login = history_trends
        .test("api > login")
        .expect("login has a trend");
    assert_eq!(login.title, "login");
    assert_eq!(login.series.len(), 15);
    assert_eq!(login.tally.failed, 3);
    assert_eq!(login.latest_status, TestStatus::Passed);

    let newest = history_trends.runs.last().expect("runs are present");
    assert_eq!(newest.id, "run-15");
    assert_eq!((newest.passed, newest.failed, newest.skipped), (2, 0, 1));

    Ok(())
}

#[test]
fn explicit_config_bounds_both_stores() -> Result<()> {
    test_init();
    let dir = Utf8TempDir::new()?;
    let config_path = dir.path().join("runledger.toml");
    std::fs::write(
        &config_path,
        indoc! {r#"
            [history]
            max-runs = 2

            [workbook]
            max-runs = 3
        "#},
    )?;
    let config = LedgerConfig::load(ConfigLocation::Explicit(&config_path))?;

    let run_dir = dir.path().join("run");
    std::fs::create_dir(&run_dir)?;
    for i in 0..4 {
        std::fs::write(
            run_dir.join(CANONICAL_REPORT_FILE_NAME),
            serde_json::to_vec(&report(
                &format!("run-{i}"),
                i * 60,
                vec![test_record("smoke", TestStatus::Passed, 5)],
            ))?,
        )?;
        let outcome = ReportPipeline::new(config.clone(), &run_dir).run()?;
        ensure!(
            matches!(outcome.source, ReportSource::Existing { .. }),
            "unsharded run uses its existing report"
        );
    }

    let pipeline = ReportPipeline::new(config, &run_dir);
    assert_eq!(pipeline.archiver().load_window()?.len(), 2);
    assert_eq!(pipeline.workbook().load_window()?.len(), 3);

    // The existing report is left as it was.
    let report_on_disk = read_run_report(&run_dir.join(CANONICAL_REPORT_FILE_NAME))?;
    assert_eq!(report_on_disk.run.id, "run-3");
    assert_eq!(report_on_disk.metadata, None);

    Ok(())
}

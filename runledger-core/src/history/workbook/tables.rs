// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion between run records and workbook sheets.
//!
//! The overview sheet has one row per retained run. Each run also has its own
//! sheet with one row per test. Both start with a header row. Reading is
//! tolerant: rows that cannot be interpreted are dropped with a warning
//! instead of failing the whole workbook.

use super::model::{Cell, Sheet, cell_at};
use crate::history::parse_canonical_run_key;
use runledger_metadata::{RunKey, RunRecord, RunTimestamp, TestRecord, TestStatus};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// The name of the overview sheet.
pub const OVERVIEW_SHEET_NAME: &str = "overview";

/// The prefix of per-run sheet names.
pub const RUN_SHEET_PREFIX: &str = "run_";

const OVERVIEW_COLUMNS: [&str; 9] = [
    "runKey",
    "id",
    "timestamp",
    "totalTests",
    "passed",
    "failed",
    "skipped",
    "duration",
    "environment",
];

const RUN_SHEET_COLUMNS: [&str; 4] = ["name", "status", "duration", "workerId"];

/// The most characters a single `.xlsx` cell can hold.
const MAX_CELL_TEXT_CHARS: usize = 32_767;

/// Returns the name of the sheet holding the tests of run `run_key`.
pub fn run_sheet_name(run_key: RunKey) -> String {
    format!("{RUN_SHEET_PREFIX}{run_key}")
}

/// Parses a per-run sheet name back into its run key.
pub fn parse_run_sheet_name(sheet_name: &str) -> Option<RunKey> {
    parse_canonical_run_key(sheet_name.strip_prefix(RUN_SHEET_PREFIX)?)
}

#[derive(Debug, Error)]
enum RowError {
    #[error("missing {column}")]
    Missing { column: &'static str },

    #[error("invalid {column} `{value}`")]
    Invalid { column: &'static str, value: String },
}

fn header_row(columns: &[&str]) -> Vec<Cell> {
    columns.iter().map(|column| Cell::text(*column)).collect()
}

/// Returns the data rows of `sheet`, numbered from 1 as a spreadsheet shows
/// them. Only the first row can be a header.
fn data_rows<'a>(
    sheet: &'a Sheet,
    columns: &'a [&str],
) -> impl Iterator<Item = (usize, &'a [Cell])> + 'a {
    sheet
        .rows
        .iter()
        .enumerate()
        .filter(move |(index, row)| {
            !(*index == 0 && is_header_row(row, columns)) && !is_blank_row(row)
        })
        .map(|(index, row)| (index + 1, row.as_slice()))
}

fn is_header_row(row: &[Cell], columns: &[&str]) -> bool {
    row.first().and_then(Cell::as_text).as_deref() == columns.first().copied()
}

fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_empty)
}

/// Builds a text cell, truncating text that does not fit in a cell.
fn bounded_text(column: &str, text: &str) -> Cell {
    match text.char_indices().nth(MAX_CELL_TEXT_CHARS) {
        Some((end, _)) => {
            warn!(
                "truncating {column} to {MAX_CELL_TEXT_CHARS} characters to fit in a workbook cell"
            );
            Cell::text(&text[..end])
        }
        None => Cell::text(text),
    }
}

pub(crate) fn encode_overview(runs: &BTreeMap<RunKey, RunRecord>) -> Sheet {
    let mut rows = vec![header_row(&OVERVIEW_COLUMNS)];
    rows.extend(runs.iter().map(|(run_key, run)| overview_row(*run_key, run)));
    Sheet::new(rows)
}

fn overview_row(run_key: RunKey, run: &RunRecord) -> Vec<Cell> {
    vec![
        Cell::Number(run_key.get() as f64),
        bounded_text("run id", &run.id),
        match &run.timestamp {
            Some(RunTimestamp::EpochMillis(millis)) => Cell::Number(*millis as f64),
            Some(RunTimestamp::Text(text)) => bounded_text("run timestamp", text),
            None => Cell::Empty,
        },
        Cell::Number(run.total_tests as f64),
        Cell::Number(run.passed as f64),
        Cell::Number(run.failed as f64),
        Cell::Number(run.skipped as f64),
        Cell::Number(run.duration as f64),
        run.environment.as_ref().map_or(Cell::Empty, |environment| {
            environment_cell(run_key, environment)
        }),
    ]
}

/// Encodes an environment as JSON text, or an empty cell if the JSON does not
/// fit in a cell.
fn environment_cell(run_key: RunKey, environment: &serde_json::Value) -> Cell {
    let text = environment.to_string();
    if text.chars().count() > MAX_CELL_TEXT_CHARS {
        warn!(
            "omitting environment of run {run_key} from workbook: \
             longer than {MAX_CELL_TEXT_CHARS} characters"
        );
        return Cell::Empty;
    }
    Cell::Text(text)
}

/// Parses the overview sheet. Unparseable rows are dropped with a warning.
pub(crate) fn parse_overview(sheet: &Sheet) -> BTreeMap<RunKey, RunRecord> {
    let mut runs = BTreeMap::new();
    for (row_number, row) in data_rows(sheet, &OVERVIEW_COLUMNS) {
        match parse_overview_row(row) {
            Ok((run_key, run)) => {
                if runs.insert(run_key, run).is_some() {
                    debug!("overview row {row_number} repeats run key {run_key}");
                }
            }
            Err(error) => {
                warn!("dropping overview row {row_number}: {error}");
            }
        }
    }
    runs
}

fn parse_overview_row(row: &[Cell]) -> Result<(RunKey, RunRecord), RowError> {
    let cell = |index: usize| cell_at(row, index);
    let required_u64 = |index: usize| -> Result<u64, RowError> {
        let column = OVERVIEW_COLUMNS[index];
        let value = cell(index);
        if value.is_empty() {
            return Err(RowError::Missing { column });
        }
        value.as_u64().ok_or_else(|| RowError::Invalid {
            column,
            value: value.as_text().unwrap_or_default(),
        })
    };

    let key_cell = cell(0);
    if key_cell.is_empty() {
        return Err(RowError::Missing { column: "runKey" });
    }
    let run_key = key_cell
        .as_i64()
        .map(RunKey::new)
        .ok_or_else(|| RowError::Invalid {
            column: "runKey",
            value: key_cell.as_text().unwrap_or_default(),
        })?;

    let timestamp = match cell(2) {
        Cell::Number(_) => cell(2).as_i64().map(RunTimestamp::EpochMillis),
        other => other.as_text().map(RunTimestamp::Text),
    };

    let environment = cell(8).as_text().map(|text| {
        serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
    });

    let run = RunRecord {
        id: cell(1).as_text().unwrap_or_default(),
        timestamp,
        total_tests: required_u64(3)?,
        passed: required_u64(4)?,
        failed: required_u64(5)?,
        skipped: required_u64(6)?,
        duration: cell(7).as_u64().unwrap_or(0),
        environment,
    };
    Ok((run_key, run))
}

pub(crate) fn encode_run_sheet(tests: &[TestRecord]) -> Sheet {
    let mut rows = vec![header_row(&RUN_SHEET_COLUMNS)];
    rows.extend(tests.iter().map(|test| {
        vec![
            bounded_text("test name", &test.name),
            Cell::text(test.status.as_str()),
            Cell::Number(test.duration as f64),
            test.worker_id
                .map_or(Cell::Empty, |worker_id| Cell::Number(f64::from(worker_id))),
        ]
    }));
    Sheet::new(rows)
}

/// Parses a per-run sheet. Rows without a test name are dropped.
pub(crate) fn parse_run_sheet(sheet: &Sheet) -> Vec<TestRecord> {
    let mut tests = Vec::new();
    for (row_number, row) in data_rows(sheet, &RUN_SHEET_COLUMNS) {
        let cell = |index: usize| cell_at(row, index);
        let Some(name) = cell(0).as_text() else {
            debug!("dropping test row {row_number} without a name");
            continue;
        };
        tests.push(TestRecord {
            name,
            status: cell(1)
                .as_text()
                .map_or(TestStatus::Unknown, |status| TestStatus::from_producer_str(&status)),
            duration: cell(2).as_u64().unwrap_or(0),
            worker_id: cell(3)
                .as_i64()
                .and_then(|worker_id| u32::try_from(worker_id).ok()),
        });
    }
    tests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_report, make_test};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn overview_round_trip() {
        let mut with_text = make_report("text", 1_700_000_000, vec![]).run;
        with_text.timestamp = Some(RunTimestamp::Text("2023-11-14T22:13:20Z".to_owned()));
        with_text.environment = Some(json!({ "os": "linux", "cpus": 8 }));
        let mut with_millis = make_report("millis", 1_700_000_100, vec![]).run;
        with_millis.total_tests = 4;
        with_millis.passed = 9;

        let runs = BTreeMap::from([
            (RunKey::new(1_700_000_000), with_text),
            (RunKey::new(1_700_000_100), with_millis),
        ]);
        let sheet = encode_overview(&runs);
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.cell(0, 8), &Cell::text("environment"));
        assert_eq!(parse_overview(&sheet), runs);
    }

    #[test]
    fn bad_overview_rows_are_dropped() {
        let good = make_report("good", 1_700_000_000, vec![]).run;
        let mut sheet = encode_overview(&BTreeMap::from([(RunKey::new(1_700_000_000), good.clone())]));

        let mut bad_key = overview_row(RunKey::new(1), &good);
        bad_key[0] = Cell::text("yesterday");
        let mut missing_passed = overview_row(RunKey::new(2), &good);
        missing_passed[4] = Cell::Empty;
        let mut bad_failed = overview_row(RunKey::new(3), &good);
        bad_failed[5] = Cell::text("many");
        sheet.rows.extend([bad_key, missing_passed, bad_failed, vec![], vec![Cell::Empty]]);

        let runs = parse_overview(&sheet);
        assert_eq!(runs, BTreeMap::from([(RunKey::new(1_700_000_000), good)]));

        assert!(matches!(
            parse_overview_row(&sheet.rows[3]),
            Err(RowError::Missing { column: "passed" })
        ));
        assert!(matches!(
            parse_overview_row(&sheet.rows[4]),
            Err(RowError::Invalid { column: "failed", .. })
        ));
    }

    #[test]
    fn environment_that_is_not_json_is_kept_as_text() {
        let mut row = overview_row(RunKey::new(5), &make_report("r", 5, vec![]).run);
        row[8] = Cell::text("linux x64");
        let (_, run) = parse_overview_row(&row).expect("row parses");
        assert_eq!(run.environment, Some(json!("linux x64")));
    }

    #[test]
    fn run_sheet_round_trip() {
        let mut worker_test = make_test("suite > b", TestStatus::Failed, 30);
        worker_test.worker_id = Some(3);
        let tests = vec![
            make_test("suite > a", TestStatus::Passed, 10),
            worker_test,
            make_test("c", TestStatus::Unknown, 0),
        ];
        let sheet = encode_run_sheet(&tests);
        assert_eq!(parse_run_sheet(&sheet), tests);
    }

    #[test]
    fn run_sheet_tolerates_loose_rows() {
        let sheet = Sheet::new(vec![
            vec![Cell::text("x"), Cell::text("timedOut"), Cell::text("12.7")],
            vec![Cell::Empty, Cell::text("passed")],
            vec![Cell::text("y"), Cell::Empty, Cell::Number(-4.0), Cell::Number(-1.0)],
        ]);
        assert_eq!(
            parse_run_sheet(&sheet),
            vec![
                make_test("x", TestStatus::Failed, 13),
                make_test("y", TestStatus::Unknown, 0),
            ]
        );
    }

    #[test]
    fn header_text_in_data_rows_is_kept() {
        let tests = vec![
            make_test("name", TestStatus::Passed, 1),
            make_test("suite > other", TestStatus::Failed, 2),
        ];
        assert_eq!(parse_run_sheet(&encode_run_sheet(&tests)), tests);

        // Without a header, the first row is data too.
        let headerless = Sheet::new(vec![vec![Cell::text("name"), Cell::text("skipped")]]);
        assert_eq!(
            parse_run_sheet(&headerless),
            vec![make_test("name", TestStatus::Skipped, 0)]
        );

        let mut sheet = encode_overview(&BTreeMap::new());
        let mut row = overview_row(RunKey::new(7), &make_report("r", 7, vec![]).run);
        row[0] = Cell::text("runKey");
        sheet.rows.push(row);
        // A repeated header further down is an invalid data row, not a header.
        assert!(parse_overview(&sheet).is_empty());
        assert!(matches!(
            parse_overview_row(&sheet.rows[1]),
            Err(RowError::Invalid { column: "runKey", .. })
        ));
    }

    #[test]
    fn oversized_text_fits_in_cells() {
        let long_name = format!("suite > {}", "é".repeat(MAX_CELL_TEXT_CHARS));
        let sheet = encode_run_sheet(&[make_test(&long_name, TestStatus::Passed, 1)]);
        let name = sheet.cell(1, 0).as_text().expect("name is text");
        assert_eq!(name.chars().count(), MAX_CELL_TEXT_CHARS);
        assert!(long_name.starts_with(&name));

        let mut run = make_report("r", 1_700_000_000, vec![]).run;
        run.environment = Some(json!({ "env": "x".repeat(40_000) }));
        let row = overview_row(RunKey::new(1_700_000_000), &run);
        assert_eq!(row[8], Cell::Empty);

        run.environment = Some(json!({ "env": "x".repeat(100) }));
        let row = overview_row(RunKey::new(1_700_000_000), &run);
        assert!(row[8].as_text().is_some());
    }

    #[test]
    fn sheet_names() {
        assert_eq!(run_sheet_name(RunKey::new(1_700_000_000)), "run_1700000000");
        assert_eq!(
            parse_run_sheet_name("run_1700000000"),
            Some(RunKey::new(1_700_000_000))
        );
        assert_eq!(parse_run_sheet_name(OVERVIEW_SHEET_NAME), None);
        assert_eq!(parse_run_sheet_name("run_latest"), None);
        assert_eq!(parse_run_sheet_name("run_+1700000000"), None);
        assert_eq!(parse_run_sheet_name("run_01700000000"), None);
    }
}

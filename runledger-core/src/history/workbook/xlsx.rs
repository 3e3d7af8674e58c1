// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading and writing `.xlsx` files.
//!
//! Existing workbooks are read with `calamine` and written back out with
//! `rust_xlsxwriter`. Only cell values survive a round trip: formatting,
//! formulas and charts are not preserved.

use super::model::{Cell, Sheet, WorkbookModel};
use crate::errors::WorkbookReadError;
use calamine::{Data, Range, Reader, Xlsx};
use camino::Utf8Path;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::io::Cursor;

/// A workbook read from disk, along with the sheets that could not be read.
#[derive(Debug)]
pub(crate) struct ReadWorkbook {
    pub(crate) model: WorkbookModel,
    pub(crate) failed_sheets: Vec<WorkbookReadError>,
}

/// Decodes a workbook from `bytes`, read from `path`.
///
/// Fails only if the bytes are not a workbook at all. Individual sheets that
/// cannot be read are reported in [`ReadWorkbook::failed_sheets`].
pub(crate) fn decode_workbook(
    path: &Utf8Path,
    bytes: Vec<u8>,
) -> Result<ReadWorkbook, WorkbookReadError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|error| WorkbookReadError::Open {
            path: path.to_owned(),
            error,
        })?;

    let mut model = WorkbookModel::default();
    let mut failed_sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                model.sheets.insert(name, sheet_from_range(&range));
            }
            Err(error) => failed_sheets.push(WorkbookReadError::Sheet {
                path: path.to_owned(),
                sheet: name,
                error,
            }),
        }
    }

    Ok(ReadWorkbook {
        model,
        failed_sheets,
    })
}

/// Converts a range into rows anchored at A1.
///
/// calamine ranges start at the first non-empty cell, so leading rows and
/// columns are padded back in.
fn sheet_from_range(range: &Range<Data>) -> Sheet {
    let Some((start_row, start_column)) = range.start() else {
        return Sheet::default();
    };

    let mut rows: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_column as usize];
        cells.extend(row.iter().map(cell_from_data));
        while cells.last().is_some_and(Cell::is_empty) {
            cells.pop();
        }
        rows.push(cells);
    }
    Sheet::new(rows)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(value) => Cell::text(value.as_str()),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(value) => Cell::Number(value.as_f64()),
        Data::DateTimeIso(value) | Data::DurationIso(value) => Cell::text(value.as_str()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

/// Encodes a workbook as `.xlsx` bytes. Sheets are written in model order.
pub(crate) fn encode_workbook(model: &WorkbookModel) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    for (name, sheet) in &model.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str())?;

        for (row_index, row) in sheet.rows.iter().enumerate() {
            let row_number =
                u32::try_from(row_index).map_err(|_| XlsxError::RowColumnLimitError)?;
            for (column_index, cell) in row.iter().enumerate() {
                let column_number =
                    u16::try_from(column_index).map_err(|_| XlsxError::RowColumnLimitError)?;
                match cell {
                    Cell::Empty => {}
                    Cell::Text(text) if text.is_empty() => {}
                    Cell::Text(text) => {
                        worksheet.write_string(row_number, column_number, text.as_str())?;
                    }
                    Cell::Number(number) => {
                        worksheet.write_number(row_number, column_number, *number)?;
                    }
                    Cell::Bool(value) => {
                        worksheet.write_boolean(row_number, column_number, *value)?;
                    }
                }
            }
        }
    }
    workbook.save_to_buffer()
}

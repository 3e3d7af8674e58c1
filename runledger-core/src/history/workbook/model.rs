// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory workbook: named sheets of rows of cells.

use indexmap::IndexMap;

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub(crate) fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the cell as text, if it is non-empty.
    ///
    /// Numbers are rendered without a trailing `.0` when integral.
    pub(crate) fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(text) if text.is_empty() => None,
            Self::Text(text) => Some(text.clone()),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                Some(format!("{}", *number as i64))
            }
            Self::Number(number) => Some(number.to_string()),
            Self::Bool(value) => Some(value.to_string()),
        }
    }

    /// Returns the cell as a finite number. Numeric text is accepted.
    pub(crate) fn as_number(&self) -> Option<f64> {
        let number = match self {
            Self::Number(number) => *number,
            Self::Text(text) => text.trim().parse().ok()?,
            Self::Empty | Self::Bool(_) => return None,
        };
        number.is_finite().then_some(number)
    }

    /// Returns the cell as an integer, rounding fractions.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        let number = self.as_number()?.round();
        (number >= i64::MIN as f64 && number < i64::MAX as f64).then_some(number as i64)
    }

    /// Returns the cell as a non-negative integer, clamping negatives to zero.
    pub(crate) fn as_u64(&self) -> Option<u64> {
        let number = self.as_number()?.round();
        Some(if number <= 0.0 { 0 } else { number as u64 })
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Self::Empty) || matches!(self, Self::Text(text) if text.is_empty())
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Returns the cell at `column` in `row`, or [`Cell::Empty`] if out of range.
pub(crate) fn cell_at(row: &[Cell], column: usize) -> &Cell {
    row.get(column).unwrap_or(&EMPTY_CELL)
}

/// The rows of one sheet. Row 0 is the first row of the sheet.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Sheet {
    pub(crate) rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub(crate) fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Returns the cell at `row`, `column`, or [`Cell::Empty`] if out of range.
    pub(crate) fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .map_or(&EMPTY_CELL, |cells| cell_at(cells, column))
    }
}

/// Sheets by name, in workbook order.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct WorkbookModel {
    pub(crate) sheets: IndexMap<String, Sheet>,
}

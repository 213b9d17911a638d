//! Spreadsheet-style addressing
//!
//! Rows and columns are 1-based. Columns are written as letters
//! (`A`, `B`, ..., `Z`, `AA`, ...) so ranges read like `A17300:G17500`.

use std::fmt;
use std::str::FromStr;

/// Convert a 1-based column index to letters (`1 -> A`, `27 -> AA`)
pub fn column_letters(mut column: u32) -> String {
    debug_assert!(column >= 1, "columns are 1-based");
    let mut letters = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        letters.push(b'A' + rem);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters to a 1-based index; `None` for empty or non-letters
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Error parsing an A1 reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError(pub String);

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cell reference: {}", self.0)
    }
}

impl std::error::Error for AddressError {}

/// A single cell, e.g. `H17402`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub column: u32,
    pub row: u64,
}

impl CellRef {
    pub fn new(column: u32, row: u64) -> Self {
        CellRef { column, row }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.column), self.row)
    }
}

impl FromStr for CellRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| AddressError(s.to_string()))?;
        let (letters, digits) = s.split_at(split);
        let column = column_index(letters).ok_or_else(|| AddressError(s.to_string()))?;
        let row: u64 = digits.parse().map_err(|_| AddressError(s.to_string()))?;
        if row == 0 {
            return Err(AddressError(s.to_string()));
        }
        Ok(CellRef { column, row })
    }
}

/// A rectangular range, inclusive on both corners, e.g. `A100:G300`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        CellRange { start, end }
    }

    /// Rows `first_row..=last_row` across columns `first_col..=last_col`
    pub fn rows(first_row: u64, last_row: u64, first_col: u32, last_col: u32) -> Self {
        CellRange {
            start: CellRef::new(first_col, first_row),
            end: CellRef::new(last_col, last_row),
        }
    }

    pub fn height(&self) -> u64 {
        self.end.row.saturating_sub(self.start.row) + 1
    }

    pub fn width(&self) -> u32 {
        self.end.column.saturating_sub(self.start.column) + 1
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once(':').ok_or_else(|| AddressError(s.to_string()))?;
        Ok(CellRange {
            start: start.parse()?,
            end: end.parse()?,
        })
    }
}

//! Ledger row model and cell normalization
//!
//! A row is always exactly [`ROW_WIDTH`] cells, columns A..H:
//!
//! | col | cell | meaning |
//! |-----|------|---------|
//! | A | 0 | timestamp `YYYY-MM-DD HH:MM:SS` |
//! | D | 3 | category (`STREAM START`, `STREAM END` or empty) |
//! | F | 5 | amount, e.g. `$12.34` |
//! | H | 7 | comment, blank on ingest, annotations land here |

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Cells per row
pub const ROW_WIDTH: usize = 8;

/// Columns read back for comparison (A..G); the comment column is never compared
pub const COMPARED_COLUMNS: usize = 7;

/// 1-based column holding comments and milestone annotations (H)
pub const COMMENT_COLUMN: u32 = 8;

pub const CATEGORY_INDEX: usize = 3;
pub const AMOUNT_INDEX: usize = 5;
pub const COMMENT_INDEX: usize = 7;

pub const STREAM_START: &str = "STREAM START";
pub const STREAM_END: &str = "STREAM END";

static REMOTE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-(\d+)-(\d+)\s(\d+):(\d+):(\d+)").expect("static regex")
});

/// A pending or remote ledger row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row {
    cells: [String; ROW_WIDTH],
}

impl Row {
    /// Build a row from source cells: pad to 8, drop anything past 8,
    /// and always blank the comment cell.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row = Row::default();
        for (slot, cell) in row.cells.iter_mut().zip(cells) {
            *slot = cell.into();
        }
        row.cells[COMMENT_INDEX].clear();
        row
    }

    /// Synthesized stream boundary row: timestamp and category only
    pub fn marker(timestamp: impl Into<String>, category: &str) -> Self {
        let mut row = Row::default();
        row.cells[0] = timestamp.into();
        row.cells[CATEGORY_INDEX] = category.to_string();
        row
    }

    pub fn cells(&self) -> &[String; ROW_WIDTH] {
        &self.cells
    }

    pub fn timestamp(&self) -> &str {
        &self.cells[0]
    }

    pub fn category(&self) -> &str {
        &self.cells[CATEGORY_INDEX]
    }

    pub fn amount(&self) -> &str {
        &self.cells[AMOUNT_INDEX]
    }

    pub fn comment(&self) -> &str {
        &self.cells[COMMENT_INDEX]
    }

    pub fn is_stream_start(&self) -> bool {
        self.category() == STREAM_START
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.cells.join(" | "))
    }
}

/// Replace every whitespace character (NBSP and friends included) with a plain space
pub fn normalize_whitespace(cell: &str) -> String {
    cell.chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect()
}

/// Zero-pad a remote timestamp: `2024-1-2 3:4:5` becomes `2024-01-02 03:04:05`.
///
/// Returns `None` when the cell does not start with a date-time.
pub fn normalize_timestamp(cell: &str) -> Option<String> {
    let caps = REMOTE_TIMESTAMP.captures(cell)?;
    let part = |i: usize| format!("{:0>2}", &caps[i]);
    Some(format!(
        "{}-{}-{} {}:{}:{}",
        part(1),
        part(2),
        part(3),
        part(4),
        part(5),
        part(6)
    ))
}

/// A currency cell that could not be read as a number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountError(pub String);

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Non-numeric amount: {:?}", self.0)
    }
}

impl std::error::Error for AmountError {}

/// Parse `$12.34` style amounts. Blank cells are `Ok(None)`.
pub fn parse_amount(cell: &str) -> Result<Option<f64>, AmountError> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| AmountError(cell.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_row_is_padded() {
        let row = Row::from_cells(["2024-05-01 10:00:00", "a", "b", "c", "d"]);
        assert_eq!(row.cells().len(), ROW_WIDTH);
        assert_eq!(row.cells()[4], "d");
        assert!(row.cells()[5..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_long_row_is_truncated_and_comment_cleared() {
        let row = Row::from_cells(["t", "1", "2", "3", "4", "5", "6", "comment", "extra"]);
        assert_eq!(row.cells()[6], "6");
        assert_eq!(row.comment(), "");
        assert!(!row.cells().iter().any(|c| c == "extra"));
    }

    #[test]
    fn test_marker_row() {
        let row = Row::marker("2024-05-01 10:00:00", STREAM_START);
        assert!(row.is_stream_start());
        assert_eq!(row.timestamp(), "2024-05-01 10:00:00");
        assert_eq!(row.cells().iter().filter(|c| !c.is_empty()).count(), 2);
    }

    #[test]
    fn test_normalize_timestamp_pads() {
        assert_eq!(
            normalize_timestamp("2024-1-2 3:4:5").as_deref(),
            Some("2024-01-02 03:04:05")
        );
        assert_eq!(
            normalize_timestamp("2024-05-01 10:00:00").as_deref(),
            Some("2024-05-01 10:00:00")
        );
        assert_eq!(normalize_timestamp("2024-05-01"), None);
        assert_eq!(normalize_timestamp("Total"), None);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("a\u{a0}b\tc"), "a b c");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$12.34"), Ok(Some(12.34)));
        assert_eq!(parse_amount("$1,000.00"), Ok(Some(1000.0)));
        assert_eq!(parse_amount("  "), Ok(None));
        assert!(parse_amount("$abc").is_err());
    }
}

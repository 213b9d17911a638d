//! Ledger Store Abstraction
//!
//! The remote ledger is a grid of string cells addressed A1-style. The sync
//! engine only needs three operations from it: read a range, write a block of
//! rows, and overwrite a single cell.
//!
//! Implementations:
//! - `InMemoryLedger`: For unit tests and DST
//! - `TsvFileLedger`: For local development (a tab separated file)
//! - `SheetsLedger`: Google Sheets (feature `sheets`)

use crate::sync::address::{CellRange, CellRef};
use crate::sync::row::{Row, COMPARED_COLUMNS, ROW_WIDTH};
use parking_lot::RwLock;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Error type for ledger operations
#[derive(Debug)]
pub enum LedgerError {
    /// Range read failed
    Read { range: CellRange, reason: String },
    /// Row append failed
    Write { range: CellRange, reason: String },
    /// The write would run past the end of the sheet
    CapacityExhausted { range: CellRange, capacity: u64 },
    /// Single-cell update failed
    Update { cell: CellRef, reason: String },
    /// The ledger could not be opened
    Open(String),
    Io(IoError),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Read { range, reason } => write!(f, "Read {} failed: {}", range, reason),
            LedgerError::Write { range, reason } => {
                write!(f, "Write {} failed: {}", range, reason)
            }
            LedgerError::CapacityExhausted { range, capacity } => write!(
                f,
                "Write {} exceeds ledger capacity of {} rows",
                range, capacity
            ),
            LedgerError::Update { cell, reason } => {
                write!(f, "Update {} failed: {}", cell, reason)
            }
            LedgerError::Open(msg) => write!(f, "Failed to open ledger: {}", msg),
            LedgerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for LedgerError {
    fn from(e: IoError) -> Self {
        LedgerError::Io(e)
    }
}

pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Remote tabular ledger
///
/// Rows and columns are 1-based. Reads may return fewer rows than requested,
/// and rows may be shorter than the range width; callers pad.
pub trait LedgerStore: Send + Sync + 'static {
    /// Read the cells of a range, row-major
    fn read_range<'a>(&'a self, range: &'a CellRange) -> LedgerFuture<'a, Vec<Vec<String>>>;

    /// Write `rows` starting at `start_row`, overwriting columns A..H
    fn append_rows<'a>(&'a self, start_row: u64, rows: &'a [Row]) -> LedgerFuture<'a, ()>;

    /// Overwrite a single cell
    fn update_cell<'a>(&'a self, cell: &'a CellRef, value: &'a str) -> LedgerFuture<'a, ()>;
}

/// Range covered by writing `count` rows at `start_row`
pub fn append_range(start_row: u64, count: usize) -> CellRange {
    let last = start_row + (count.max(1) as u64) - 1;
    CellRange::rows(start_row, last, 1, ROW_WIDTH as u32)
}

/// True when every compared cell (A..G) is empty
pub fn is_blank(cells: &[String]) -> bool {
    cells.iter().take(COMPARED_COLUMNS).all(|c| c.is_empty())
}

// ============================================================================
// Grid - shared cell storage
// ============================================================================

/// Dense row-major grid, index 0 is ledger row 1
#[derive(Debug, Clone, Default)]
struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    fn read(&self, range: &CellRange) -> Vec<Vec<String>> {
        let first_col = range.start.column as usize - 1;
        let width = range.width() as usize;
        (range.start.row..=range.end.row)
            .map(|row| {
                let source = self.rows.get(row as usize - 1);
                (first_col..first_col + width)
                    .map(|col| {
                        source
                            .and_then(|cells| cells.get(col))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }

    fn write_rows(&mut self, start_row: u64, rows: &[Row]) {
        let needed = start_row as usize - 1 + rows.len();
        if self.rows.len() < needed {
            self.rows.resize_with(needed, || vec![String::new(); ROW_WIDTH]);
        }
        for (i, row) in rows.iter().enumerate() {
            self.rows[start_row as usize - 1 + i] = row.cells().to_vec();
        }
    }

    fn write_cell(&mut self, cell: &CellRef) -> &mut String {
        let row = cell.row as usize;
        if self.rows.len() < row {
            self.rows.resize_with(row, || vec![String::new(); ROW_WIDTH]);
        }
        let cells = &mut self.rows[row - 1];
        let col = cell.column as usize;
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        &mut cells[col - 1]
    }

    fn next_free_row(&self) -> u64 {
        self.rows
            .iter()
            .rposition(|cells| !is_blank(cells))
            .map(|idx| idx as u64 + 2)
            .unwrap_or(1)
    }
}

// ============================================================================
// InMemoryLedger - For tests and DST
// ============================================================================

/// In-memory ledger for unit tests and deterministic simulation
///
/// Clones share the same grid, so a test can keep a handle for inspection
/// while the driver owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    grid: Arc<RwLock<Grid>>,
    capacity: Option<u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose appends fail past `capacity` rows
    pub fn with_capacity(capacity: u64) -> Self {
        InMemoryLedger {
            grid: Arc::new(RwLock::new(Grid::default())),
            capacity: Some(capacity),
        }
    }

    /// Ledger pre-populated from row 1
    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let ledger = Self::new();
        ledger.grid.write().rows = rows.into_iter().collect();
        ledger
    }

    /// Cells of a ledger row (padded to 8)
    pub fn row(&self, row: u64) -> Vec<String> {
        let range = CellRange::rows(row, row, 1, ROW_WIDTH as u32);
        self.grid.read().read(&range).remove(0)
    }

    /// Overwrite a ledger row directly, the way a human editor would
    pub fn set_row(&self, row: u64, cells: Vec<String>) {
        let mut grid = self.grid.write();
        if grid.rows.len() < row as usize {
            grid.rows
                .resize_with(row as usize, || vec![String::new(); ROW_WIDTH]);
        }
        grid.rows[row as usize - 1] = cells;
    }

    /// Row after the last non-blank row
    pub fn next_free_row(&self) -> u64 {
        self.grid.read().next_free_row()
    }

    /// Number of rows the grid has ever held, blank ones included
    pub fn row_count(&self) -> u64 {
        self.grid.read().rows.len() as u64
    }

    /// All non-blank rows with their row numbers
    pub fn non_blank_rows(&self) -> Vec<(u64, Vec<String>)> {
        self.grid
            .read()
            .rows
            .iter()
            .enumerate()
            .filter(|(_, cells)| !is_blank(cells))
            .map(|(idx, cells)| (idx as u64 + 1, cells.clone()))
            .collect()
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    fn check_capacity(&self, range: &CellRange) -> Result<(), LedgerError> {
        match self.capacity {
            Some(capacity) if range.end.row > capacity => Err(LedgerError::CapacityExhausted {
                range: *range,
                capacity,
            }),
            _ => Ok(()),
        }
    }
}

impl LedgerStore for InMemoryLedger {
    fn read_range<'a>(&'a self, range: &'a CellRange) -> LedgerFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move { Ok(self.grid.read().read(range)) })
    }

    fn append_rows<'a>(&'a self, start_row: u64, rows: &'a [Row]) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            self.check_capacity(&append_range(start_row, rows.len()))?;
            self.grid.write().write_rows(start_row, rows);
            Ok(())
        })
    }

    fn update_cell<'a>(&'a self, cell: &'a CellRef, value: &'a str) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            if let Some(capacity) = self.capacity {
                if cell.row > capacity {
                    return Err(LedgerError::Update {
                        cell: *cell,
                        reason: format!("row beyond capacity of {}", capacity),
                    });
                }
            }
            *self.grid.write().write_cell(cell) = value.to_string();
            Ok(())
        })
    }
}

// ============================================================================
// TsvFileLedger - For development
// ============================================================================

/// Ledger backed by a tab separated file, one line per row
///
/// Every write rewrites the file through a temporary file and a rename.
#[derive(Debug)]
pub struct TsvFileLedger {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl TsvFileLedger {
    /// Open (or create) the ledger file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::Open(format!("{}: {}", parent.display(), e)))?;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(LedgerError::Open(format!(
                    "{} is not a file",
                    path.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::write(&path, b"")
                    .await
                    .map_err(|e| LedgerError::Open(format!("{}: {}", path.display(), e)))?;
            }
            Err(e) => return Err(LedgerError::Open(format!("{}: {}", path.display(), e))),
        }
        Ok(TsvFileLedger {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Grid, IoError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let rows = text
            .lines()
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect();
        Ok(Grid { rows })
    }

    async fn store(&self, grid: &Grid) -> Result<(), IoError> {
        let mut text = String::new();
        for cells in &grid.rows {
            let line: Vec<String> = cells.iter().map(|c| sanitize(c)).collect();
            text.push_str(line.join("\t").trim_end_matches('\t'));
            text.push('\n');
        }
        let tmp = self.path.with_extension("tsv.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

/// Cells may not contain the file's own delimiters
fn sanitize(cell: &str) -> String {
    cell.replace(['\t', '\n', '\r'], " ")
}

impl LedgerStore for TsvFileLedger {
    fn read_range<'a>(&'a self, range: &'a CellRange) -> LedgerFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            let grid = self.load().await.map_err(|e| LedgerError::Read {
                range: *range,
                reason: e.to_string(),
            })?;
            Ok(grid.read(range))
        })
    }

    fn append_rows<'a>(&'a self, start_row: u64, rows: &'a [Row]) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            let range = append_range(start_row, rows.len());
            let write_err = |e: IoError| LedgerError::Write {
                range,
                reason: e.to_string(),
            };
            let _guard = self.write_lock.lock().await;
            let mut grid = self.load().await.map_err(write_err)?;
            grid.write_rows(start_row, rows);
            self.store(&grid).await.map_err(write_err)
        })
    }

    fn update_cell<'a>(&'a self, cell: &'a CellRef, value: &'a str) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            let update_err = |e: IoError| LedgerError::Update {
                cell: *cell,
                reason: e.to_string(),
            };
            let _guard = self.write_lock.lock().await;
            let mut grid = self.load().await.map_err(update_err)?;
            *grid.write_cell(cell) = value.to_string();
            self.store(&grid).await.map_err(update_err)
        })
    }
}

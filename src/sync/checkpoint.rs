//! Checkpoint Persistence
//!
//! The checkpoint is a single row number: the first ledger row believed to
//! be free. It is written only after rows have been appended, so on restart
//! it can lag the ledger but never run ahead of it.
//!
//! ## File format
//!
//! The decimal integer, optionally followed by a newline. Writes go to
//! `<path>.tmp`, are synced, then renamed over `<path>`.

use parking_lot::Mutex;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Error type for checkpoint operations
#[derive(Debug)]
pub enum CheckpointError {
    /// I/O error
    Io(std::io::Error),
    /// File contents are not a row number
    InvalidFormat(String),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "I/O error: {}", e),
            CheckpointError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(e) => Some(e),
            CheckpointError::InvalidFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

pub type CheckpointFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CheckpointError>> + Send + 'a>>;

/// Durable storage for the checkpoint row
pub trait CheckpointStore: Send + Sync + 'static {
    /// Stored checkpoint, `None` on first run
    fn load(&self) -> CheckpointFuture<'_, Option<u64>>;

    /// Replace the stored checkpoint
    fn persist(&self, row: u64) -> CheckpointFuture<'_, ()>;
}

/// Starting checkpoint: explicit override, else stored value, else configured row
pub fn resolve_start(override_row: Option<u64>, stored: Option<u64>, configured: u64) -> u64 {
    override_row.or(stored).unwrap_or(configured).max(1)
}

fn parse_checkpoint(text: &str) -> Result<u64, CheckpointError> {
    let trimmed = text.trim();
    match trimmed.parse::<u64>() {
        Ok(row) if row >= 1 => Ok(row),
        _ => Err(CheckpointError::InvalidFormat(format!(
            "expected a row number, got {:?}",
            trimmed
        ))),
    }
}

// ============================================================================
// FileCheckpointStore
// ============================================================================

/// Checkpoint kept in a local text file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> CheckpointFuture<'_, Option<u64>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(text) => parse_checkpoint(&text).map(Some),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn persist(&self, row: u64) -> CheckpointFuture<'_, ()> {
        Box::pin(async move {
            let tmp = self.tmp_path();
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(format!("{}\n", row).as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await?;
            Ok(())
        })
    }
}

// ============================================================================
// MemoryCheckpointStore - For tests and DST
// ============================================================================

#[derive(Debug, Default)]
struct MemoryCheckpointInner {
    current: Option<u64>,
    history: Vec<u64>,
}

/// In-memory checkpoint that records every persisted value
///
/// Clones share state, so a restarted driver sees what the previous one wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<MemoryCheckpointInner>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `row`
    pub fn with_value(row: u64) -> Self {
        let store = Self::new();
        store.inner.lock().current = Some(row);
        store
    }

    pub fn current(&self) -> Option<u64> {
        self.inner.lock().current
    }

    /// Every value passed to `persist`, in order
    pub fn history(&self) -> Vec<u64> {
        self.inner.lock().history.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> CheckpointFuture<'_, Option<u64>> {
        Box::pin(async move { Ok(self.inner.lock().current) })
    }

    fn persist(&self, row: u64) -> CheckpointFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock();
            inner.current = Some(row);
            inner.history.push(row);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_start_precedence() {
        assert_eq!(resolve_start(Some(10), Some(20), 30), 10);
        assert_eq!(resolve_start(None, Some(20), 30), 20);
        assert_eq!(resolve_start(None, None, 30), 30);
        assert_eq!(resolve_start(Some(0), None, 30), 1);
    }

    #[test]
    fn test_parse_checkpoint() {
        assert_eq!(parse_checkpoint("17400\n").unwrap(), 17400);
        assert!(matches!(
            parse_checkpoint("abc"),
            Err(CheckpointError::InvalidFormat(_))
        ));
        assert!(parse_checkpoint("0").is_err());
        assert!(parse_checkpoint("").is_err());
    }

    #[tokio::test]
    async fn test_file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("row.txt"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("row.txt");
        let store = FileCheckpointStore::new(&path);

        store.persist(17402).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(17402));
        assert!(!store.tmp_path().exists());

        store.persist(17410).await.unwrap();
        let reopened = FileCheckpointStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), Some(17410));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "17410\n");
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("row.txt");
        std::fs::write(&path, "not a number").unwrap();

        let err = FileCheckpointStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_memory_store_history() {
        let store = MemoryCheckpointStore::with_value(5);
        let shared = store.clone();

        assert_eq!(store.load().await.unwrap(), Some(5));
        store.persist(7).await.unwrap();
        store.persist(9).await.unwrap();

        assert_eq!(shared.current(), Some(9));
        assert_eq!(shared.history(), vec![7, 9]);
    }
}

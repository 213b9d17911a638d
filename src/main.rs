//! ledger-sync
//!
//! Reads event lines from stdin and keeps the ledger in step with them.
//!
//! Exit codes:
//! - 0: input closed and everything was flushed
//! - 1: too many consecutive sync failures
//! - 2: bad configuration or the ledger could not be opened

use clap::{Parser, ValueEnum};
use ledger_sync::observability::{init_tracing, LogFormat, TracingConfig};
use ledger_sync::sync::{
    spawn_line_reader, ConfigError, FileCheckpointStore, LedgerBackend,
    LedgerStore, SyncConfig, SyncDriver, SyncError, TsvFileLedger,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

const MEMORY_BACKEND_REJECTED: &str =
    "the memory backend would checkpoint a ledger that is discarded on exit; use sheets or tsv";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Sheets,
    Tsv,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ledger-sync", version, about = "Sync an event stream into a shared ledger")]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(long, env = "LEDGER_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Credentials JSON holding an access token
    #[arg(long, env = "LEDGER_SYNC_CREDENTIALS_FILE")]
    credentials_file: Option<PathBuf>,

    /// Spreadsheet id
    #[arg(long, env = "LEDGER_SYNC_SHEET_ID")]
    sheet_id: Option<String>,

    /// Worksheet (tab) name
    #[arg(long, env = "LEDGER_SYNC_WORKSHEET")]
    worksheet: Option<String>,

    /// Start at this row, ignoring any saved checkpoint
    #[arg(long, env = "LEDGER_SYNC_STARTING_ROW")]
    starting_row: Option<u64>,

    /// Checkpoint file
    #[arg(long, env = "LEDGER_SYNC_CHECKPOINT_FILE")]
    checkpoint_file: Option<PathBuf>,

    #[arg(long, value_enum, env = "LEDGER_SYNC_BACKEND")]
    backend: Option<BackendArg>,

    /// Ledger file for the tsv backend
    #[arg(long, env = "LEDGER_SYNC_LEDGER_FILE")]
    ledger_file: Option<PathBuf>,

    #[arg(long, value_enum, env = "LEDGER_SYNC_LOG_FORMAT")]
    log_format: Option<LogFormatArg>,
}

impl Cli {
    fn into_config(self) -> Result<(SyncConfig, Option<u64>), ConfigError> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_toml_file(path)?,
            None => SyncConfig::default(),
        };

        if let Some(path) = self.credentials_file {
            config.ledger.credentials_file = path;
        }
        if let Some(id) = self.sheet_id {
            config.ledger.spreadsheet_id = Some(id);
        }
        if let Some(worksheet) = self.worksheet {
            config.ledger.worksheet = worksheet;
        }
        if let Some(path) = self.checkpoint_file {
            config.checkpoint_path = path;
        }
        if let Some(backend) = self.backend {
            config.ledger.backend = match backend {
                BackendArg::Sheets => LedgerBackend::Sheets,
                BackendArg::Tsv => LedgerBackend::Tsv,
            };
        }
        if let Some(path) = self.ledger_file {
            config.ledger.ledger_file = Some(path);
        }

        config.validate()?;
        if config.ledger.backend == LedgerBackend::Memory {
            return Err(ConfigError::Invalid(MEMORY_BACKEND_REJECTED.into()));
        }
        Ok((config, self.starting_row))
    }
}

enum Failure {
    Config(String),
    Sync(SyncError),
}

impl From<SyncError> for Failure {
    fn from(e: SyncError) -> Self {
        Failure::Sync(e)
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Failure::Config(e.to_string())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::from_env();
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        });
    }
    init_tracing(&tracing_config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Config(msg)) => {
            error!(error = %msg, "Startup failed");
            ExitCode::from(2)
        }
        Err(Failure::Sync(SyncError::StoreOpen(msg))) => {
            error!(error = %msg, "Failed to open store");
            ExitCode::from(2)
        }
        Err(Failure::Sync(e)) => {
            error!(error = %e, "Sync stopped");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let (config, starting_row) = cli.into_config()?;

    match config.ledger.backend {
        LedgerBackend::Sheets => open_sheets(config, starting_row).await,
        LedgerBackend::Tsv => {
            let path = config
                .ledger
                .ledger_file
                .clone()
                .ok_or_else(|| Failure::Config("tsv backend needs --ledger-file".into()))?;
            let store = TsvFileLedger::open(path)
                .await
                .map_err(|e| Failure::Sync(SyncError::StoreOpen(e.to_string())))?;
            sync(store, config, starting_row).await
        }
        LedgerBackend::Memory => Err(Failure::Config(MEMORY_BACKEND_REJECTED.into())),
    }
}

#[cfg(feature = "sheets")]
async fn open_sheets(config: SyncConfig, starting_row: Option<u64>) -> Result<(), Failure> {
    let store = ledger_sync::sync::SheetsLedger::open(&config.ledger)
        .await
        .map_err(|e| Failure::Sync(SyncError::StoreOpen(e.to_string())))?;
    sync(store, config, starting_row).await
}

#[cfg(not(feature = "sheets"))]
async fn open_sheets(_config: SyncConfig, _starting_row: Option<u64>) -> Result<(), Failure> {
    Err(Failure::Config(
        "sheets backend not compiled in (build with --features sheets)".into(),
    ))
}

async fn sync<S: LedgerStore>(
    store: S,
    config: SyncConfig,
    starting_row: Option<u64>,
) -> Result<(), Failure> {
    let checkpoints = FileCheckpointStore::new(config.checkpoint_path.clone());
    let mut driver = SyncDriver::open(store, checkpoints, config, starting_row).await?;
    info!(checkpoint = driver.checkpoint(), "Reading events from stdin");

    let (lines, reader) = spawn_line_reader(tokio::io::stdin());
    let stats = driver.run(lines).await?;
    let line_count = reader.await.unwrap_or_default();
    info!(lines = line_count, rows = stats.rows_appended, "Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ledger-sync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_memory_backend_from_toml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(&path, "[ledger]\nbackend = \"memory\"\n").unwrap();

        let err = cli(&["--config", path.to_str().unwrap()])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("memory backend"));
    }

    #[test]
    fn test_flag_overrides_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(&path, "[ledger]\nbackend = \"memory\"\n").unwrap();
        let ledger = dir.path().join("ledger.tsv");

        let (config, starting_row) = cli(&[
            "--config",
            path.to_str().unwrap(),
            "--backend",
            "tsv",
            "--ledger-file",
            ledger.to_str().unwrap(),
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.ledger.backend, LedgerBackend::Tsv);
        assert_eq!(starting_row, None);
    }
}

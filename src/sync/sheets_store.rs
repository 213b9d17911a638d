//! Google Sheets Ledger
//!
//! `LedgerStore` over the Sheets v4 values API.
//!
//! Credentials are a JSON file holding an OAuth bearer token:
//!
//! ```json
//! { "access_token": "ya29...." }
//! ```
//!
//! Writes use `USER_ENTERED` so timestamps and currency cells are parsed by
//! the sheet the same way typed input would be. Unlike the append endpoint,
//! a values update does not grow the grid, so appends that would run past
//! the last row first add rows with an `appendDimension` request.

use crate::sync::address::{CellRange, CellRef};
use crate::sync::config::LedgerConfig;
use crate::sync::ledger_store::{append_range, LedgerError, LedgerFuture, LedgerStore};
use crate::sync::row::Row;
use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/";

/// Rows added beyond what an append needs when the grid is grown
const GROWTH_HEADROOM: u64 = 100;

#[derive(Deserialize)]
struct Credentials {
    access_token: Option<String>,
    private_key: Option<String>,
}

#[derive(Deserialize, Default)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    grid_properties: GridProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    row_count: u64,
}

/// One worksheet of a Google spreadsheet
pub struct SheetsLedger {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    worksheet: String,
    sheet_id: i64,
    token: String,
    row_count: Mutex<u64>,
}

impl SheetsLedger {
    /// Read credentials and check that the worksheet exists
    pub async fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .ok_or_else(|| LedgerError::Open("no spreadsheet id configured".into()))?;
        let text = tokio::fs::read_to_string(&config.credentials_file)
            .await
            .map_err(|e| {
                LedgerError::Open(format!("{}: {}", config.credentials_file.display(), e))
            })?;
        let credentials: Credentials = serde_json::from_str(&text)
            .map_err(|e| LedgerError::Open(format!("credentials: {}", e)))?;
        let token = match credentials {
            Credentials {
                access_token: Some(token),
                ..
            } => token,
            Credentials {
                private_key: Some(_),
                ..
            } => {
                return Err(LedgerError::Open(
                    "service account keys must be exchanged for an access_token first".into(),
                ))
            }
            _ => return Err(LedgerError::Open("credentials have no access_token".into())),
        };
        let base = Url::parse(SHEETS_ENDPOINT).map_err(|e| LedgerError::Open(e.to_string()))?;

        let mut ledger = SheetsLedger {
            client: Client::new(),
            base,
            spreadsheet_id,
            worksheet: config.worksheet.clone(),
            sheet_id: 0,
            token,
            row_count: Mutex::new(0),
        };
        ledger.load_properties().await?;
        info!(
            spreadsheet = %ledger.spreadsheet_id,
            worksheet = %ledger.worksheet,
            rows = *ledger.row_count.lock(),
            "Opened Google Sheets ledger"
        );
        Ok(ledger)
    }

    fn spreadsheet_url(&self, suffix: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v4", "spreadsheets"]);
            segments.extend(suffix);
        }
        url
    }

    fn a1(&self, range: impl std::fmt::Display) -> String {
        format!("'{}'!{}", self.worksheet.replace('\'', "''"), range)
    }

    async fn load_properties(&mut self) -> Result<(), LedgerError> {
        let mut url = self.spreadsheet_url(&[self.spreadsheet_id.as_str()]);
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::Open(e.to_string()))?;
        let spreadsheet: Spreadsheet = response
            .json()
            .await
            .map_err(|e| LedgerError::Open(e.to_string()))?;

        let sheet = spreadsheet
            .sheets
            .into_iter()
            .find(|s| s.properties.title == self.worksheet)
            .ok_or_else(|| LedgerError::Open(format!("worksheet {:?} not found", self.worksheet)))?;
        self.sheet_id = sheet.properties.sheet_id;
        *self.row_count.lock() = sheet.properties.grid_properties.row_count;
        Ok(())
    }

    async fn ensure_rows(&self, range: &CellRange) -> Result<(), LedgerError> {
        let current = *self.row_count.lock();
        if range.end.row <= current {
            return Ok(());
        }
        let length = range.end.row - current + GROWTH_HEADROOM;
        let batch = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.spreadsheet_url(&[batch.as_str()]);
        let body = json!({
            "requests": [{
                "appendDimension": {
                    "sheetId": self.sheet_id,
                    "dimension": "ROWS",
                    "length": length,
                }
            }]
        });
        let grown = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = grown {
            tracing::error!(error = %e, range = %range, "Failed to grow worksheet");
            return Err(LedgerError::CapacityExhausted {
                range: *range,
                capacity: current,
            });
        }
        *self.row_count.lock() = current + length;
        info!(added = length, rows = current + length, "Grew worksheet");
        Ok(())
    }
}

/// Trim a read to the worksheet grid; `None` when it starts past the last row.
///
/// Rows past the grid are blank, and the reconciler pads short reads.
fn clamp_to_grid(range: &CellRange, row_count: u64) -> Option<CellRange> {
    if range.start.row > row_count {
        return None;
    }
    let mut clamped = *range;
    clamped.end.row = clamped.end.row.min(row_count);
    Some(clamped)
}

/// Formatted values arrive as strings; anything else is rendered as JSON text
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl LedgerStore for SheetsLedger {
    fn read_range<'a>(&'a self, range: &'a CellRange) -> LedgerFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            let row_count = *self.row_count.lock();
            let Some(grid_range) = clamp_to_grid(range, row_count) else {
                debug!(range = %range, rows = row_count, "Read past the end of the worksheet");
                return Ok(Vec::new());
            };
            let a1 = self.a1(grid_range);
            let url = self.spreadsheet_url(&[self.spreadsheet_id.as_str(), "values", &a1]);
            let read_err = |e: reqwest::Error| LedgerError::Read {
                range: *range,
                reason: e.to_string(),
            };
            let body: ValueRange = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(read_err)?
                .json()
                .await
                .map_err(read_err)?;
            debug!(range = %range, rows = body.values.len(), "Read ledger range");
            Ok(body
                .values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect())
        })
    }

    fn append_rows<'a>(&'a self, start_row: u64, rows: &'a [Row]) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            let range = append_range(start_row, rows.len());
            self.ensure_rows(&range).await?;

            let a1 = self.a1(range);
            let mut url = self.spreadsheet_url(&[self.spreadsheet_id.as_str(), "values", &a1]);
            url.query_pairs_mut()
                .append_pair("valueInputOption", "USER_ENTERED");
            let values: Vec<&[String]> = rows.iter().map(|r| r.cells().as_slice()).collect();
            let body = json!({ "range": a1, "majorDimension": "ROWS", "values": values });

            self.client
                .put(url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| LedgerError::Write {
                    range,
                    reason: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn update_cell<'a>(&'a self, cell: &'a CellRef, value: &'a str) -> LedgerFuture<'a, ()> {
        Box::pin(async move {
            let a1 = self.a1(cell);
            let mut url = self.spreadsheet_url(&[self.spreadsheet_id.as_str(), "values", &a1]);
            url.query_pairs_mut()
                .append_pair("valueInputOption", "USER_ENTERED");
            let body = json!({ "range": a1, "values": [[value]] });

            self.client
                .put(url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| LedgerError::Update {
                    cell: *cell,
                    reason: e.to_string(),
                })?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(json!("$5.00")), "$5.00");
        assert_eq!(cell_text(json!(12)), "12");
        assert_eq!(cell_text(serde_json::Value::Null), "");
    }

    #[test]
    fn test_reads_are_clamped_to_grid() {
        let window = CellRange::rows(17300, 17500, 1, 7);
        let clamped = clamp_to_grid(&window, 17450).unwrap();
        assert_eq!(clamped.to_string(), "A17300:G17450");

        let inside = CellRange::rows(10, 20, 1, 7);
        assert_eq!(clamp_to_grid(&inside, 1000), Some(inside));

        let beyond = CellRange::rows(17451, 17500, 1, 7);
        assert_eq!(clamp_to_grid(&beyond, 17450), None);
    }

    #[tokio::test]
    async fn test_open_rejects_service_account_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"type":"service_account","private_key":"---"}"#).unwrap();

        let config = LedgerConfig {
            spreadsheet_id: Some("sheet".into()),
            credentials_file: path,
            ..LedgerConfig::default()
        };
        let err = SheetsLedger::open(&config).await.err().unwrap();
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn test_open_requires_credentials_file() {
        let config = LedgerConfig {
            spreadsheet_id: Some("sheet".into()),
            credentials_file: PathBuf::from("/nonexistent/creds.json"),
            ..LedgerConfig::default()
        };
        assert!(matches!(
            SheetsLedger::open(&config).await,
            Err(LedgerError::Open(_))
        ));
    }
}

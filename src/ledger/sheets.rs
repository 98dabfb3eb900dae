// src/ledger/sheets.rs

use super::{FIRST_DATA_ROW, Ledger, LedgerError};
use crate::config::SheetsConfig;
use crate::schema::{ExpenseRecord, SHEET_COLUMNS, column_index};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{info, warn};
use urlencoding::encode;
use yup_oauth2::authenticator::Authenticator;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

static UPDATED_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"![A-Z]+(\d+)").expect("valid A1 row regex"));

/// Ledger backed by a Google Sheets worksheet, via the v4 REST API and a
/// service-account token.
pub struct SheetsLedger {
    client: Client,
    auth: Authenticator<HttpsConnector<HttpConnector>>,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsLedger {
    pub async fn connect(cfg: &SheetsConfig) -> Result<Self, LedgerError> {
        if cfg.spreadsheet_id.is_empty() {
            return Err(LedgerError::Sheets("spreadsheet id is not configured".into()));
        }
        let key = yup_oauth2::read_service_account_key(&cfg.service_account_file).await?;
        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await?;
        info!(
            spreadsheet = %cfg.spreadsheet_id,
            worksheet = %cfg.worksheet,
            "Connected to Google Sheets"
        );
        Ok(Self {
            client: Client::new(),
            auth,
            spreadsheet_id: cfg.spreadsheet_id.clone(),
            worksheet: cfg.worksheet.clone(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{API_BASE}/{}/values/{}",
            self.spreadsheet_id,
            encode(range)
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, LedgerError> {
        let token = self
            .auth
            .token(SCOPES)
            .await
            .map_err(|e| LedgerError::Sheets(format!("auth failed: {e}")))?;
        let bearer = token
            .token()
            .ok_or_else(|| LedgerError::Sheets("auth returned no access token".into()))?;

        let response = request
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| LedgerError::Sheets(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Sheets(format!("API error {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| LedgerError::Sheets(e.to_string()))
    }

    /// Numeric sheet id of the configured worksheet, needed for row deletes.
    async fn sheet_id(&self) -> Result<i64, LedgerError> {
        let url = format!(
            "{API_BASE}/{}?fields={}",
            self.spreadsheet_id,
            encode("sheets.properties")
        );
        let meta = self.send(self.client.get(url)).await?;
        sheet_id_for(&meta, &self.worksheet).ok_or_else(|| {
            LedgerError::Sheets(format!("worksheet '{}' not found", self.worksheet))
        })
    }
}

/// `'Name'!A1` notation; quotes inside the name are doubled.
fn a1_range(worksheet: &str, cells: &str) -> String {
    let quoted = format!("'{}'", worksheet.replace('\'', "''"));
    if cells.is_empty() {
        quoted
    } else {
        format!("{quoted}!{cells}")
    }
}

/// Spreadsheet column letters for a 1-based index: 1 → A, 27 → AA.
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Row number from an append response's `updates.updatedRange`.
fn updated_row(response: &Value) -> Option<u32> {
    let range = response["updates"]["updatedRange"].as_str()?;
    UPDATED_ROW.captures(range)?[1].parse().ok()
}

fn sheet_id_for(meta: &Value, worksheet: &str) -> Option<i64> {
    meta["sheets"]
        .as_array()?
        .iter()
        .map(|s| &s["properties"])
        .find(|p| p["title"].as_str() == Some(worksheet))?["sheetId"]
        .as_i64()
}

/// `values` of a ValueRange as strings; absent when the range is empty.
fn value_rows(range: &Value) -> Vec<Vec<String>> {
    let Some(rows) = range["values"].as_array() else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|c| match c {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn append(&self, record: &ExpenseRecord) -> Result<u32, LedgerError> {
        let range = a1_range(&self.worksheet, &format!("A:{}", column_letter(SHEET_COLUMNS.len())));
        let url = format!(
            "{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            self.values_url(&range)
        );
        let body = json!({ "values": [record.to_sheet_row()] });
        let response = self.send(self.client.post(url).json(&body)).await?;

        let row = match updated_row(&response) {
            Some(row) => row,
            None => {
                warn!("Append response had no updated range, counting rows instead");
                self.rows().await?.len() as u32
            }
        };
        info!(row, date = %record.date, category = %record.category, "Entry appended");
        Ok(row)
    }

    async fn update_field(&self, row: u32, column: &str, value: &str) -> Result<(), LedgerError> {
        let idx = column_index(column).ok_or_else(|| LedgerError::InvalidField(column.to_string()))?;
        if row < FIRST_DATA_ROW {
            return Err(LedgerError::InvalidRow(row));
        }
        let range = a1_range(&self.worksheet, &format!("{}{row}", column_letter(idx)));
        let url = format!("{}?valueInputOption=USER_ENTERED", self.values_url(&range));
        let body = json!({ "range": range, "values": [[value]] });
        self.send(self.client.put(url).json(&body)).await?;
        info!(row, column, "Entry updated");
        Ok(())
    }

    async fn delete(&self, row: u32) -> Result<(), LedgerError> {
        if row < FIRST_DATA_ROW {
            return Err(LedgerError::InvalidRow(row));
        }
        let sheet_id = self.sheet_id().await?;
        let url = format!("{API_BASE}/{}:batchUpdate", self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row,
                    }
                }
            }]
        });
        self.send(self.client.post(url).json(&body)).await?;
        info!(row, "Entry deleted");
        Ok(())
    }

    async fn rows(&self) -> Result<Vec<Vec<String>>, LedgerError> {
        let url = self.values_url(&a1_range(&self.worksheet, ""));
        let range = self.send(self.client.get(url)).await?;
        Ok(value_rows(&range))
    }

    async fn read_range(&self, name: &str) -> Result<Vec<String>, LedgerError> {
        let range = self.send(self.client.get(self.values_url(name))).await?;
        Ok(value_rows(&range)
            .into_iter()
            .flatten()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(2), "B");
        assert_eq!(column_letter(10), "J");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
    }

    #[test]
    fn ranges_quote_worksheet_names() {
        assert_eq!(a1_range("Sheet1", "A:J"), "'Sheet1'!A:J");
        assert_eq!(a1_range("Разходи 2026", "B5"), "'Разходи 2026'!B5");
        assert_eq!(a1_range("Bob's", ""), "'Bob''s'");
    }

    #[test]
    fn row_from_append_response() {
        let response = json!({
            "spreadsheetId": "abc",
            "updates": { "updatedRange": "'Sheet1'!A57:J57", "updatedRows": 1 }
        });
        assert_eq!(updated_row(&response), Some(57));
        assert_eq!(updated_row(&json!({})), None);
    }

    #[test]
    fn sheet_id_by_title() {
        let meta = json!({
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Sheet1" } },
                { "properties": { "sheetId": 812, "title": "Разходи" } }
            ]
        });
        assert_eq!(sheet_id_for(&meta, "Разходи"), Some(812));
        assert_eq!(sheet_id_for(&meta, "Sheet1"), Some(0));
        assert_eq!(sheet_id_for(&meta, "Missing"), None);
    }

    #[test]
    fn value_rows_stringify_cells() {
        let range = json!({
            "range": "Categories",
            "values": [["Храна", "Гориво"], [], [12.5, true]]
        });
        assert_eq!(
            value_rows(&range),
            vec![
                vec!["Храна".to_string(), "Гориво".to_string()],
                vec![],
                vec!["12.5".to_string(), "true".to_string()],
            ]
        );
        assert!(value_rows(&json!({ "range": "Empty" })).is_empty());
    }

    #[test]
    fn ledger_width_is_column_j() {
        assert_eq!(column_letter(SHEET_COLUMNS.len()), "J");
    }
}

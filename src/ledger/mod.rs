// src/ledger/mod.rs

mod sheets;
mod sqlite;

pub use sheets::SheetsLedger;
pub use sqlite::SqliteLedger;

use crate::schema::{CATEGORY_COLUMN, ExpenseRecord, TAX_ID_COLUMN};
use async_trait::async_trait;

/// First data row; row 1 is the header.
pub const FIRST_DATA_ROW: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Unknown column: {0}")]
    InvalidField(String),
    #[error("Row {0} is not a data row")]
    InvalidRow(u32),
    #[error("Named ranges are not supported by this ledger")]
    Unsupported,
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Google Sheets error: {0}")]
    Sheets(String),
    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

/// Row-addressed expense storage, spreadsheet style: rows are 1-based and
/// include the header, so deleting a row shifts every row below it up.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append a record, returning its row number.
    async fn append(&self, record: &ExpenseRecord) -> Result<u32, LedgerError>;

    /// Overwrite one cell, addressed by column header name.
    async fn update_field(&self, row: u32, column: &str, value: &str) -> Result<(), LedgerError>;

    async fn delete(&self, row: u32) -> Result<(), LedgerError>;

    /// Every row, header first.
    async fn rows(&self) -> Result<Vec<Vec<String>>, LedgerError>;

    /// Non-blank cells of a named range, in reading order.
    async fn read_range(&self, _name: &str) -> Result<Vec<String>, LedgerError> {
        Err(LedgerError::Unsupported)
    }
}

/// The category most often recorded for `tax_id`, earliest winner on ties.
///
/// `None` when the header lacks either column or nothing matches.
pub fn most_common_category(rows: &[Vec<String>], tax_id: &str) -> Option<String> {
    let (header, data) = rows.split_first()?;
    let tax_col = header.iter().position(|h| h.trim() == TAX_ID_COLUMN)?;
    let cat_col = header.iter().position(|h| h.trim() == CATEGORY_COLUMN)?;

    let mut counts: Vec<(&str, usize)> = Vec::new();
    let categories = data
        .iter()
        .filter(|row| row.get(tax_col).is_some_and(|t| t.trim() == tax_id))
        .filter_map(|row| row.get(cat_col).map(|c| c.trim()))
        .filter(|c| !c.is_empty());
    for category in categories {
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (category, n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((category, n));
        }
    }
    best.map(|(c, _)| c.to_string())
}

/// Historical category for a tax ID, read from the ledger.
pub async fn lookup_category(ledger: &dyn Ledger, tax_id: &str) -> Result<Option<String>, LedgerError> {
    if tax_id.is_empty() {
        return Ok(None);
    }
    let rows = ledger.rows().await?;
    Ok(most_common_category(&rows, tax_id))
}

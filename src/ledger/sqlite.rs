// src/ledger/sqlite.rs

use super::{FIRST_DATA_ROW, Ledger, LedgerError};
use crate::schema::{ExpenseRecord, SHEET_COLUMNS, column_index};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// SQL column for each ledger column, same order as `SHEET_COLUMNS`.
const SQL_COLUMNS: [&str; 10] = [
    "date",
    "category",
    "total_bgn",
    "total_eur",
    "ggbg_bgn",
    "payment_method",
    "extra_fee",
    "payback",
    "notes",
    "tax_id",
];

/// Local ledger in SQLite. Row numbers are positions in insertion order,
/// offset by the virtual header row, so it behaves like the spreadsheet.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) a ledger database file.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, LedgerError> {
        if let Some(dir) = db_path.as_ref().parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                total_bgn TEXT NOT NULL DEFAULT '',
                total_eur TEXT NOT NULL DEFAULT '',
                ggbg_bgn TEXT NOT NULL DEFAULT '',
                payment_method TEXT NOT NULL DEFAULT '',
                extra_fee TEXT NOT NULL DEFAULT '',
                payback TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                tax_id TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_tax_id ON entries(tax_id)",
            [],
        )?;

        info!("Ledger database initialized");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Primary key of the entry shown at spreadsheet row `row`.
    fn entry_id(conn: &Connection, row: u32) -> Result<i64, LedgerError> {
        if row < FIRST_DATA_ROW {
            return Err(LedgerError::InvalidRow(row));
        }
        conn.query_row(
            "SELECT id FROM entries ORDER BY id LIMIT 1 OFFSET ?1",
            params![row - FIRST_DATA_ROW],
            |r| r.get(0),
        )
        .optional()?
        .ok_or(LedgerError::InvalidRow(row))
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn append(&self, record: &ExpenseRecord) -> Result<u32, LedgerError> {
        let cells = record.to_sheet_row();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries
                (date, category, total_bgn, total_eur, ggbg_bgn, payment_method, extra_fee, payback, notes, tax_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                cells[0], cells[1], cells[2], cells[3], cells[4], cells[5], cells[6], cells[7],
                cells[8], cells[9],
            ],
        )?;
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
        let row = count + FIRST_DATA_ROW - 1;
        info!(row, date = %record.date, category = %record.category, "Entry appended");
        Ok(row)
    }

    async fn update_field(&self, row: u32, column: &str, value: &str) -> Result<(), LedgerError> {
        let idx = column_index(column).ok_or_else(|| LedgerError::InvalidField(column.to_string()))?;
        let sql_column = SQL_COLUMNS[idx - 1];
        let conn = self.lock()?;
        let id = Self::entry_id(&conn, row)?;
        conn.execute(
            &format!("UPDATE entries SET {sql_column} = ?1 WHERE id = ?2"),
            params![value, id],
        )?;
        info!(row, column, "Entry updated");
        Ok(())
    }

    async fn delete(&self, row: u32) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        let id = Self::entry_id(&conn, row)?;
        conn.execute("DELETE FROM entries WHERE id = ?1", params![id])?;
        info!(row, "Entry deleted");
        Ok(())
    }

    async fn rows(&self) -> Result<Vec<Vec<String>>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries ORDER BY id",
            SQL_COLUMNS.join(", ")
        ))?;
        let data = stmt.query_map([], |r| {
            (0..SQL_COLUMNS.len())
                .map(|i| r.get::<_, String>(i))
                .collect::<rusqlite::Result<Vec<String>>>()
        })?;

        let mut rows: Vec<Vec<String>> = vec![SHEET_COLUMNS.iter().map(|c| c.to_string()).collect()];
        for row in data {
            rows.push(row?);
        }
        Ok(rows)
    }
}

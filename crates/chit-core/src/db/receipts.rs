//! Receipt operations

use rusqlite::{params, OptionalExtension};

use super::{parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{MatchStatus, NewReceipt, Receipt};

impl Database {
    /// Register a receipt handed over by the upload/OCR pipeline
    pub fn create_receipt(&self, receipt: &NewReceipt) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO receipts (owner, amount, receipt_date, vendor) VALUES (?, ?, ?, ?)",
            params![
                receipt.owner,
                receipt.amount,
                receipt.receipt_date.map(|d| d.to_string()),
                receipt.vendor,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get receipt by ID
    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, receipt_date, vendor, match_status, created_at
             FROM receipts WHERE id = ?",
        )?;

        let receipt = stmt
            .query_row(params![id], |row| Self::row_to_receipt(row))
            .optional()?;

        Ok(receipt)
    }

    /// List an owner's receipts, optionally filtered by status
    pub fn list_receipts(&self, owner: &str, status: Option<MatchStatus>) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, receipt_date, vendor, match_status, created_at
             FROM receipts
             WHERE owner = ? AND (? IS NULL OR match_status = ?)
             ORDER BY created_at DESC, id DESC",
        )?;

        let status_str = status.map(|s| s.as_str());
        let receipts = stmt
            .query_map(params![owner, status_str, status_str], |row| {
                Self::row_to_receipt(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// Unmatched receipts for one owner, oldest first so the auto-match
    /// queue is stable across runs
    pub fn unmatched_receipts(&self, owner: &str) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, receipt_date, vendor, match_status, created_at
             FROM receipts
             WHERE owner = ? AND match_status = 'unmatched'
             ORDER BY id ASC",
        )?;

        let receipts = stmt
            .query_map(params![owner], |row| Self::row_to_receipt(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(receipts)
    }

    /// Helper to convert a row to Receipt
    pub(crate) fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let date_str: Option<String> = row.get(3)?;
        let status_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        Ok(Receipt {
            id: row.get(0)?,
            owner: row.get(1)?,
            amount: row.get(2)?,
            receipt_date: date_str.as_deref().and_then(parse_date),
            vendor: row.get(4)?,
            match_status: status_str.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at_str),
        })
    }
}

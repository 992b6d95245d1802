//! Candidate window queries backing the finder
//!
//! These queries apply the hard exclusion rules; scoring and selection
//! happen above the storage layer. Grouped transactions never come back as
//! individual candidates, and anything that already carries a live
//! (non-rejected) match is out.

use chrono::NaiveDate;
use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{Transaction, TransactionGroup};

impl Database {
    /// Unmatched, ungrouped transactions inside the amount/date windows
    pub fn candidate_transactions(
        &self,
        owner: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        amount_min: f64,
        amount_max: f64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, owner, amount, transaction_date, description, group_id, match_status, created_at
            FROM transactions t
            WHERE t.owner = ?
              AND t.group_id IS NULL
              AND t.match_status = 'unmatched'
              AND t.transaction_date >= ? AND t.transaction_date <= ?
              AND ABS(t.amount) >= ? AND ABS(t.amount) <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM matches m
                  WHERE m.transaction_id = t.id AND m.state != 'rejected'
              )
            ORDER BY t.transaction_date DESC, t.id DESC
            "#,
        )?;

        let txs = stmt
            .query_map(
                params![
                    owner,
                    date_from.to_string(),
                    date_to.to_string(),
                    amount_min,
                    amount_max
                ],
                |row| Self::row_to_transaction(row),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Unmatched groups inside the amount/date windows
    pub fn candidate_groups(
        &self,
        owner: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        amount_min: f64,
        amount_max: f64,
    ) -> Result<Vec<TransactionGroup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, owner, description, combined_amount, display_date, transaction_count,
                   match_status, matched_receipt_id, created_at
            FROM transaction_groups g
            WHERE g.owner = ?
              AND g.match_status = 'unmatched'
              AND g.display_date >= ? AND g.display_date <= ?
              AND g.combined_amount >= ? AND g.combined_amount <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM matches m
                  WHERE m.transaction_group_id = g.id AND m.state != 'rejected'
              )
            ORDER BY g.display_date DESC, g.id DESC
            "#,
        )?;

        let groups = stmt
            .query_map(
                params![
                    owner,
                    date_from.to_string(),
                    date_to.to_string(),
                    amount_min,
                    amount_max
                ],
                |row| Self::row_to_group(row),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(groups)
    }
}

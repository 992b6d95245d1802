//! Transaction and transaction-group operations

use rusqlite::{params, OptionalExtension};

use super::{parse_date, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{MatchStatus, NewTransaction, Transaction, TransactionGroup};

impl Database {
    /// Register a transaction handed over by the statement-import pipeline
    pub fn create_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (owner, amount, transaction_date, description)
             VALUES (?, ?, ?, ?)",
            params![
                tx.owner,
                tx.amount,
                tx.transaction_date.to_string(),
                tx.description,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, transaction_date, description, group_id, match_status, created_at
             FROM transactions WHERE id = ?",
        )?;

        let tx = stmt
            .query_row(params![id], |row| Self::row_to_transaction(row))
            .optional()?;

        Ok(tx)
    }

    /// List an owner's transactions, optionally filtered by status
    pub fn list_transactions(
        &self,
        owner: &str,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, transaction_date, description, group_id, match_status, created_at
             FROM transactions
             WHERE owner = ? AND (? IS NULL OR match_status = ?)
             ORDER BY transaction_date DESC, id DESC",
        )?;

        let status_str = status.map(|s| s.as_str());
        let txs = stmt
            .query_map(params![owner, status_str, status_str], |row| {
                Self::row_to_transaction(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(txs)
    }

    /// Collapse several of an owner's transactions into one matchable group.
    ///
    /// Members must belong to the owner, be ungrouped, and carry no live
    /// match. The group inherits the first member's description (members of
    /// a group are the same vendor in practice), sums member magnitudes, and
    /// displays the latest member date.
    pub fn create_group(&self, owner: &str, member_ids: &[i64]) -> Result<i64> {
        if member_ids.len() < 2 {
            return Err(Error::Validation(
                "a transaction group needs at least two members".to_string(),
            ));
        }
        let unique: std::collections::HashSet<i64> = member_ids.iter().copied().collect();
        if unique.len() != member_ids.len() {
            return Err(Error::Validation(
                "duplicate transaction ids in group".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut members = Vec::with_capacity(member_ids.len());
        for &id in member_ids {
            let member = tx
                .query_row(
                    "SELECT id, owner, amount, transaction_date, description, group_id, match_status, created_at
                     FROM transactions WHERE id = ?",
                    params![id],
                    |row| Self::row_to_transaction(row),
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("transaction {} not found", id)))?;

            if member.owner != owner {
                return Err(Error::Validation(format!(
                    "transaction {} belongs to another owner",
                    id
                )));
            }
            if member.group_id.is_some() {
                return Err(Error::Validation(format!(
                    "transaction {} is already grouped",
                    id
                )));
            }
            if member.match_status != MatchStatus::Unmatched {
                return Err(Error::Validation(format!(
                    "transaction {} is not unmatched",
                    id
                )));
            }
            let live_match: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM matches WHERE transaction_id = ? AND state != 'rejected')",
                params![id],
                |row| row.get(0),
            )?;
            if live_match {
                return Err(Error::Validation(format!(
                    "transaction {} already carries a live match",
                    id
                )));
            }
            members.push(member);
        }

        let combined_amount: f64 = members.iter().map(|m| m.amount.abs()).sum();
        let display_date = members
            .iter()
            .map(|m| m.transaction_date)
            .max()
            .ok_or_else(|| Error::Validation("empty member list".to_string()))?;
        let description = members[0].description.clone();

        tx.execute(
            "INSERT INTO transaction_groups (owner, description, combined_amount, display_date, transaction_count)
             VALUES (?, ?, ?, ?, ?)",
            params![
                owner,
                description,
                combined_amount,
                display_date.to_string(),
                members.len() as i64,
            ],
        )?;
        let group_id = tx.last_insert_rowid();

        for member in &members {
            tx.execute(
                "UPDATE transactions SET group_id = ? WHERE id = ?",
                params![group_id, member.id],
            )?;
        }

        tx.commit()?;
        Ok(group_id)
    }

    /// Get group by ID
    pub fn get_group(&self, id: i64) -> Result<Option<TransactionGroup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, description, combined_amount, display_date, transaction_count,
                    match_status, matched_receipt_id, created_at
             FROM transaction_groups WHERE id = ?",
        )?;

        let group = stmt
            .query_row(params![id], |row| Self::row_to_group(row))
            .optional()?;

        Ok(group)
    }

    /// List an owner's groups, optionally filtered by status
    pub fn list_groups(
        &self,
        owner: &str,
        status: Option<MatchStatus>,
    ) -> Result<Vec<TransactionGroup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, description, combined_amount, display_date, transaction_count,
                    match_status, matched_receipt_id, created_at
             FROM transaction_groups
             WHERE owner = ? AND (? IS NULL OR match_status = ?)
             ORDER BY display_date DESC, id DESC",
        )?;

        let status_str = status.map(|s| s.as_str());
        let groups = stmt
            .query_map(params![owner, status_str, status_str], |row| {
                Self::row_to_group(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    /// Member transactions of a group
    pub fn group_members(&self, group_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, amount, transaction_date, description, group_id, match_status, created_at
             FROM transactions WHERE group_id = ? ORDER BY transaction_date ASC, id ASC",
        )?;

        let members = stmt
            .query_map(params![group_id], |row| Self::row_to_transaction(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(members)
    }

    /// Disband a group, releasing its members back to individual matching.
    /// Refused while the group carries a live match.
    pub fn delete_group(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM transaction_groups WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(format!("group {} not found", id)));
        }

        let live_match: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM matches WHERE transaction_group_id = ? AND state != 'rejected')",
            params![id],
            |row| row.get(0),
        )?;
        if live_match {
            return Err(Error::Validation(format!(
                "group {} carries a live match; reject it first",
                id
            )));
        }

        tx.execute(
            "UPDATE transactions SET group_id = NULL WHERE group_id = ?",
            params![id],
        )?;
        tx.execute("DELETE FROM transaction_groups WHERE id = ?", params![id])?;

        tx.commit()?;
        Ok(())
    }

    /// Helper to convert a row to Transaction
    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(3)?;
        let status_str: String = row.get(6)?;
        let created_at_str: String = row.get(7)?;

        Ok(Transaction {
            id: row.get(0)?,
            owner: row.get(1)?,
            amount: row.get(2)?,
            transaction_date: parse_date(&date_str).unwrap_or_default(),
            description: row.get(4)?,
            group_id: row.get(5)?,
            match_status: status_str.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at_str),
        })
    }

    /// Helper to convert a row to TransactionGroup
    pub(crate) fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<TransactionGroup> {
        let date_str: String = row.get(4)?;
        let status_str: String = row.get(6)?;
        let created_at_str: String = row.get(8)?;

        Ok(TransactionGroup {
            id: row.get(0)?,
            owner: row.get(1)?,
            description: row.get(2)?,
            combined_amount: row.get(3)?,
            display_date: parse_date(&date_str).unwrap_or_default(),
            transaction_count: row.get(5)?,
            match_status: status_str.parse().unwrap_or_default(),
            matched_receipt_id: row.get(7)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}

//! Match record operations
//!
//! Reads and proposal writes live here. The confirm/reject/manual
//! transitions belong to the lifecycle manager, which owns the cross-entity
//! transactions.

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Match, MatchState, MatchTarget, NewMatch};

impl Database {
    /// Write a proposal: the match row plus the receipt's move to Proposed,
    /// in one transaction. The target is not advanced; only confirm does
    /// that. Fails with Conflict if the receipt was consumed in between.
    pub fn record_proposal(&self, new_match: &NewMatch) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let moved = tx.execute(
            "UPDATE receipts SET match_status = 'proposed'
             WHERE id = ? AND match_status = 'unmatched'",
            params![new_match.receipt_id],
        )?;
        if moved == 0 {
            return Err(Error::Conflict(format!(
                "receipt {} is no longer unmatched",
                new_match.receipt_id
            )));
        }

        let (transaction_id, group_id) = new_match.target.into_columns();
        tx.execute(
            r#"
            INSERT INTO matches (owner, receipt_id, transaction_id, transaction_group_id, state,
                                 amount_score, date_score, vendor_score, confidence_score,
                                 match_reason, is_manual)
            VALUES (?, ?, ?, ?, 'proposed', ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new_match.owner,
                new_match.receipt_id,
                transaction_id,
                group_id,
                new_match.breakdown.amount_score,
                new_match.breakdown.date_score,
                new_match.breakdown.vendor_score,
                new_match.breakdown.confidence_score,
                new_match.breakdown.reason,
                new_match.is_manual,
            ],
        )?;
        let match_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(match_id)
    }

    /// Get match by ID
    pub fn get_match(&self, id: i64) -> Result<Option<Match>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM matches WHERE id = ?",
            MATCH_COLUMNS
        ))?;

        let m = stmt
            .query_row(params![id], |row| Self::row_to_match(row))
            .optional()?;

        Ok(m)
    }

    /// The receipt's live (non-rejected) match, if any. Invariant: at most
    /// one exists.
    pub fn active_match_for_receipt(&self, receipt_id: i64) -> Result<Option<Match>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM matches WHERE receipt_id = ? AND state != 'rejected' LIMIT 1",
            MATCH_COLUMNS
        ))?;

        let m = stmt
            .query_row(params![receipt_id], |row| Self::row_to_match(row))
            .optional()?;

        Ok(m)
    }

    /// Whether a target already carries a live (non-rejected) match
    pub fn target_has_active_match(&self, target: MatchTarget) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = match target {
            MatchTarget::Transaction(id) => conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM matches WHERE transaction_id = ? AND state != 'rejected')",
                params![id],
                |row| row.get(0),
            )?,
            MatchTarget::Group(id) => conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM matches WHERE transaction_group_id = ? AND state != 'rejected')",
                params![id],
                |row| row.get(0),
            )?,
        };
        Ok(exists)
    }

    /// Review queue: an owner's matches ordered by confidence, optionally
    /// filtered by state
    pub fn list_matches(&self, owner: &str, state: Option<MatchState>) -> Result<Vec<Match>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM matches
             WHERE owner = ? AND (? IS NULL OR state = ?)
             ORDER BY confidence_score DESC, id ASC",
            MATCH_COLUMNS
        ))?;

        let state_str = state.map(|s| s.as_str());
        let matches = stmt
            .query_map(params![owner, state_str, state_str], |row| {
                Self::row_to_match(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(matches)
    }

    /// Proposed match ids at or above a confidence floor, best first, for
    /// the batch-approve sweep
    pub fn proposed_match_ids(&self, owner: &str, min_confidence: f64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM matches
             WHERE owner = ? AND state = 'proposed' AND confidence_score >= ?
             ORDER BY confidence_score DESC, id ASC",
        )?;

        let ids = stmt
            .query_map(params![owner, min_confidence], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Helper to convert a row to Match
    pub(crate) fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
        let transaction_id: Option<i64> = row.get(3)?;
        let group_id: Option<i64> = row.get(4)?;
        let state_str: String = row.get(5)?;
        let confirmed_at_str: Option<String> = row.get(12)?;
        let created_at_str: String = row.get(14)?;

        // The CHECK constraint guarantees exactly one target column is set.
        let target = MatchTarget::from_columns(transaction_id, group_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Integer,
                e.into(),
            )
        })?;

        Ok(Match {
            id: row.get(0)?,
            owner: row.get(1)?,
            receipt_id: row.get(2)?,
            target,
            state: state_str.parse().unwrap_or_default(),
            amount_score: row.get(6)?,
            date_score: row.get(7)?,
            vendor_score: row.get(8)?,
            confidence_score: row.get(9)?,
            match_reason: row.get(10)?,
            is_manual: row.get(11)?,
            confirmed_at: confirmed_at_str.map(|s| parse_datetime(&s)),
            confirmed_by: row.get(13)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}

/// Column list shared by the match queries; order matches `row_to_match`
const MATCH_COLUMNS: &str = "id, owner, receipt_id, transaction_id, transaction_group_id, state, \
     amount_score, date_score, vendor_score, confidence_score, match_reason, is_manual, \
     confirmed_at, confirmed_by, created_at";

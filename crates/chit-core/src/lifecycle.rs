//! Match lifecycle: confirm, reject, manual creation, batch approval
//!
//! The single place that mutates Receipt/Transaction/Group state. Every
//! transition takes the owner's lock and runs one immediate-mode SQLite
//! transaction across the match and both linked records, so a partially
//! applied transition is never observable. Conflicts (target consumed, busy
//! database) are retried once; a second failure surfaces as `Conflict`,
//! which batch operations record and skip.

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::locks::{CancelFlag, OwnerLocks};
use crate::models::{
    BatchApproveSummary, Match, MatchState, MatchStatus, MatchTarget, NewMatch, ScoreBreakdown,
};

/// Lifecycle manager over a shared database and lock registry
pub struct MatchLifecycle<'a> {
    db: &'a Database,
    locks: &'a OwnerLocks,
}

impl<'a> MatchLifecycle<'a> {
    pub fn new(db: &'a Database, locks: &'a OwnerLocks) -> Self {
        Self { db, locks }
    }

    /// Confirm a proposed match: match Confirmed, receipt Matched, target
    /// Matched (and the group learns its receipt).
    pub fn confirm_match(&self, match_id: i64, confirmed_by: &str) -> Result<Match> {
        let owner = self.owner_of_match(match_id)?;
        let lock = self.locks.for_owner(&owner);
        let _guard = lock.lock();

        with_retry(|| self.confirm_in_tx(match_id, confirmed_by))?;

        info!(match_id, confirmed_by, "match confirmed");
        self.db
            .get_match(match_id)?
            .ok_or_else(|| Error::NotFound(format!("match {} not found", match_id)))
    }

    /// Reject a proposed or confirmed match: match Rejected, receipt and
    /// target back to Unmatched so both reappear as future candidates.
    pub fn reject_match(&self, match_id: i64) -> Result<Match> {
        let owner = self.owner_of_match(match_id)?;
        let lock = self.locks.for_owner(&owner);
        let _guard = lock.lock();

        with_retry(|| self.reject_in_tx(match_id))?;

        info!(match_id, "match rejected");
        self.db
            .get_match(match_id)?
            .ok_or_else(|| Error::NotFound(format!("match {} not found", match_id)))
    }

    /// Create a manual match. The target enum already guarantees exactly one
    /// of transaction/group; callers translating an either/or request reject
    /// the XOR violation before getting here. Manual matches start Proposed
    /// and go through the same confirm step as automatic ones.
    pub fn create_manual_match(
        &self,
        owner: &str,
        receipt_id: i64,
        target: MatchTarget,
    ) -> Result<Match> {
        let lock = self.locks.for_owner(owner);
        let _guard = lock.lock();

        let receipt = self
            .db
            .get_receipt(receipt_id)?
            .ok_or_else(|| Error::NotFound(format!("receipt {} not found", receipt_id)))?;
        if receipt.owner != owner {
            return Err(Error::Validation(format!(
                "receipt {} belongs to another owner",
                receipt_id
            )));
        }
        if receipt.match_status != MatchStatus::Unmatched {
            return Err(Error::Validation(format!(
                "receipt {} is not unmatched",
                receipt_id
            )));
        }

        match target {
            MatchTarget::Transaction(id) => {
                let tx = self
                    .db
                    .get_transaction(id)?
                    .ok_or_else(|| Error::NotFound(format!("transaction {} not found", id)))?;
                if tx.owner != owner {
                    return Err(Error::Validation(format!(
                        "transaction {} belongs to another owner",
                        id
                    )));
                }
                if tx.group_id.is_some() {
                    return Err(Error::Validation(format!(
                        "transaction {} is grouped; match its group instead",
                        id
                    )));
                }
                if tx.match_status != MatchStatus::Unmatched {
                    return Err(Error::Validation(format!(
                        "transaction {} is not unmatched",
                        id
                    )));
                }
            }
            MatchTarget::Group(id) => {
                let group = self
                    .db
                    .get_group(id)?
                    .ok_or_else(|| Error::NotFound(format!("group {} not found", id)))?;
                if group.owner != owner {
                    return Err(Error::Validation(format!(
                        "group {} belongs to another owner",
                        id
                    )));
                }
                if group.match_status != MatchStatus::Unmatched {
                    return Err(Error::Validation(format!("group {} is not unmatched", id)));
                }
            }
        }
        // A proposal against the target does not advance its status, so the
        // status check above is not enough on its own.
        if self.db.target_has_active_match(target)? {
            return Err(Error::Validation(format!(
                "{} already carries a live match",
                target
            )));
        }

        let match_id = self.db.record_proposal(&NewMatch {
            owner: owner.to_string(),
            receipt_id,
            target,
            breakdown: ScoreBreakdown::zero("manual match"),
            is_manual: true,
        })?;

        info!(match_id, receipt_id, target = %target, "manual match created");
        self.db
            .get_match(match_id)?
            .ok_or_else(|| Error::NotFound(format!("match {} not found", match_id)))
    }

    /// Confirm every proposed match at or above the confidence floor.
    /// Per-item failures are counted and skipped, never fatal to the batch;
    /// the cancel flag is honored between items.
    pub fn batch_approve(
        &self,
        owner: &str,
        min_confidence: f64,
        approved_by: &str,
        cancel: &CancelFlag,
    ) -> Result<BatchApproveSummary> {
        let ids = self.db.proposed_match_ids(owner, min_confidence)?;
        let mut summary = BatchApproveSummary::default();

        for match_id in ids {
            if cancel.is_cancelled() {
                info!(owner, "batch approve cancelled");
                break;
            }
            match self.confirm_match(match_id, approved_by) {
                Ok(_) => summary.approved += 1,
                Err(e) if e.is_skippable() => {
                    warn!(match_id, error = %e, "skipping match in batch approve");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            owner,
            approved = summary.approved,
            skipped = summary.skipped,
            "batch approve finished"
        );
        Ok(summary)
    }

    fn owner_of_match(&self, match_id: i64) -> Result<String> {
        let m = self
            .db
            .get_match(match_id)?
            .ok_or_else(|| Error::NotFound(format!("match {} not found", match_id)))?;
        Ok(m.owner)
    }

    fn confirm_in_tx(&self, match_id: i64, confirmed_by: &str) -> Result<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (state, receipt_id, target) = read_match_row(&tx, match_id)?;
        if state != MatchState::Proposed {
            return Err(Error::InvalidState(format!(
                "match {} is {}, not proposed",
                match_id, state
            )));
        }

        // The proposal left the target Unmatched; anything else means it was
        // consumed since (e.g. a competing confirm).
        let target_status: Option<String> = match target {
            MatchTarget::Transaction(id) => tx
                .query_row(
                    "SELECT match_status FROM transactions WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?,
            MatchTarget::Group(id) => tx
                .query_row(
                    "SELECT match_status FROM transaction_groups WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?,
        };
        match target_status.as_deref() {
            Some("unmatched") => {}
            Some(_) => {
                return Err(Error::Conflict(format!(
                    "{} was consumed by another match",
                    target
                )))
            }
            None => return Err(Error::NotFound(format!("{} not found", target))),
        }

        let updated = tx.execute(
            "UPDATE matches
             SET state = 'confirmed', confirmed_at = CURRENT_TIMESTAMP, confirmed_by = ?
             WHERE id = ? AND state = 'proposed'",
            params![confirmed_by, match_id],
        )?;
        if updated == 0 {
            return Err(Error::Conflict(format!(
                "match {} changed state mid-confirm",
                match_id
            )));
        }

        tx.execute(
            "UPDATE receipts SET match_status = 'matched' WHERE id = ?",
            params![receipt_id],
        )?;
        match target {
            MatchTarget::Transaction(id) => {
                tx.execute(
                    "UPDATE transactions SET match_status = 'matched' WHERE id = ?",
                    params![id],
                )?;
            }
            MatchTarget::Group(id) => {
                tx.execute(
                    "UPDATE transaction_groups
                     SET match_status = 'matched', matched_receipt_id = ?
                     WHERE id = ?",
                    params![receipt_id, id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn reject_in_tx(&self, match_id: i64) -> Result<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (state, receipt_id, target) = read_match_row(&tx, match_id)?;
        if state == MatchState::Rejected {
            return Err(Error::InvalidState(format!(
                "match {} is already rejected",
                match_id
            )));
        }

        tx.execute(
            "UPDATE matches SET state = 'rejected' WHERE id = ?",
            params![match_id],
        )?;
        tx.execute(
            "UPDATE receipts SET match_status = 'unmatched' WHERE id = ?",
            params![receipt_id],
        )?;
        match target {
            MatchTarget::Transaction(id) => {
                tx.execute(
                    "UPDATE transactions SET match_status = 'unmatched' WHERE id = ?",
                    params![id],
                )?;
            }
            MatchTarget::Group(id) => {
                tx.execute(
                    "UPDATE transaction_groups
                     SET match_status = 'unmatched', matched_receipt_id = NULL
                     WHERE id = ?",
                    params![id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Minimal match fields needed inside a lifecycle transaction
fn read_match_row(
    tx: &rusqlite::Transaction<'_>,
    match_id: i64,
) -> Result<(MatchState, i64, MatchTarget)> {
    let row = tx
        .query_row(
            "SELECT state, receipt_id, transaction_id, transaction_group_id
             FROM matches WHERE id = ?",
            params![match_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("match {} not found", match_id)))?;

    let state: MatchState = row.0.parse().unwrap_or_default();
    let target = MatchTarget::from_columns(row.2, row.3).map_err(Error::Validation)?;
    Ok((state, row.1, target))
}

/// Run an operation, retrying once on a recoverable conflict (busy database
/// or state drift). A second failure propagates.
fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(e) if is_retryable(&e) => {
            warn!(error = %e, "retrying lifecycle operation after conflict");
            op()
        }
        other => other,
    }
}

fn is_retryable(e: &Error) -> bool {
    match e {
        Error::Conflict(_) => true,
        Error::Database(rusqlite::Error::SqliteFailure(f, _)) => {
            f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
        }
        _ => false,
    }
}

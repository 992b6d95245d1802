//! Auto-match orchestration
//!
//! Sweeps every unmatched receipt in scope through the proposal selector,
//! one receipt at a time. Sequential processing per owner is deliberate: it
//! is what eliminates the race class where concurrent receipt processing
//! left receipts stranded mid-status. Owners are independent; callers may
//! run different owners in parallel.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::MatchingConfig;
use crate::db::Database;
use crate::error::Result;
use crate::locks::{CancelFlag, OwnerLocks};
use crate::models::{AutoMatchSummary, CandidateKind};
use crate::selector::ProposalSelector;

/// Drives auto-match runs and records their history
pub struct AutoMatchOrchestrator<'a> {
    db: &'a Database,
    config: &'a MatchingConfig,
    locks: &'a OwnerLocks,
}

impl<'a> AutoMatchOrchestrator<'a> {
    pub fn new(db: &'a Database, config: &'a MatchingConfig, locks: &'a OwnerLocks) -> Self {
        Self { db, config, locks }
    }

    /// Run auto-match for one owner. The cancel flag is checked between
    /// receipts only; the receipt in flight always finishes its atomic unit
    /// of work. Per-receipt failures and timeouts are recorded in the
    /// summary and never abort the run.
    pub fn run_for_owner(&self, owner: &str, cancel: &CancelFlag) -> Result<AutoMatchSummary> {
        let run_id = self.db.create_match_run(owner)?;
        let started = Instant::now();
        let budget = Duration::from_millis(self.config.run.receipt_timeout_ms);

        let receipts = self.db.unmatched_receipts(owner)?;
        let selector = ProposalSelector::new(self.db, self.config);

        let mut summary = AutoMatchSummary::default();
        let mut cancelled = false;

        for receipt in &receipts {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            summary.processed += 1;
            let deadline = Instant::now() + budget;

            // One owner, one writer: the proposal attempt (read, score,
            // write) runs under the owner's lock as a single unit.
            let lock = self.locks.for_owner(owner);
            let guard = lock.lock();
            let outcome = selector.propose(receipt, Some(deadline));
            drop(guard);

            match outcome {
                Ok(outcome) if outcome.timed_out => {
                    warn!(receipt_id = receipt.id, "receipt attempt timed out");
                    summary.failed += 1;
                }
                Ok(outcome) => {
                    if outcome.match_id.is_some() {
                        summary.proposed += 1;
                        match outcome.kind {
                            Some(CandidateKind::Individual) => summary.transaction_matches += 1,
                            Some(CandidateKind::Group) => summary.group_matches += 1,
                            None => {}
                        }
                        if outcome.ambiguous {
                            summary.ambiguous += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(receipt_id = receipt.id, error = %e, "receipt attempt failed");
                    summary.failed += 1;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as i64;
        let status = if cancelled { "cancelled" } else { "completed" };
        self.db.finish_match_run(run_id, status, &summary)?;

        info!(
            owner,
            run_id,
            status,
            processed = summary.processed,
            proposed = summary.proposed,
            transaction_matches = summary.transaction_matches,
            group_matches = summary.group_matches,
            ambiguous = summary.ambiguous,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "auto-match run finished"
        );
        Ok(summary)
    }

    /// Run auto-match for every owner with data, sequentially. Used by the
    /// scheduled sweep.
    pub fn run_all(&self, cancel: &CancelFlag) -> Result<Vec<(String, AutoMatchSummary)>> {
        let mut results = Vec::new();
        for owner in self.db.distinct_owners()? {
            if cancel.is_cancelled() {
                break;
            }
            let summary = self.run_for_owner(&owner, cancel)?;
            results.push((owner, summary));
        }
        Ok(results)
    }
}

//! Candidate discovery for one receipt
//!
//! Pulls the owner's unmatched transactions and groups inside the tolerance
//! windows and wraps them for scoring. The hard exclusion rules (grouped
//! transactions, anything with a live match) are enforced by the window
//! queries; this layer computes the windows and ranks the results.

use chrono::Duration;
use tracing::debug;

use crate::config::MatchingConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{CandidateKind, CandidateRecord, MatchStatus, Receipt, ScoredCandidate};
use crate::scoring::MatchScorer;

/// Finds viable candidates for a receipt
pub struct CandidateFinder<'a> {
    db: &'a Database,
    config: &'a MatchingConfig,
}

impl<'a> CandidateFinder<'a> {
    pub fn new(db: &'a Database, config: &'a MatchingConfig) -> Self {
        Self { db, config }
    }

    /// Raw candidates inside the windows. Empty when the receipt cannot be
    /// matched (missing amount/date, or it already carries a live match) --
    /// that is a normal outcome, not an error.
    pub fn find_for_receipt(&self, receipt: &Receipt) -> Result<Vec<CandidateRecord>> {
        if receipt.match_status != MatchStatus::Unmatched {
            debug!(receipt_id = receipt.id, "receipt already has a live match");
            return Ok(vec![]);
        }
        let (amount, date) = match (receipt.amount, receipt.receipt_date) {
            (Some(a), Some(d)) => (a.abs(), d),
            _ => {
                debug!(receipt_id = receipt.id, "receipt missing extracted amount/date");
                return Ok(vec![]);
            }
        };

        // The SQL window uses the widest date band; scoring applies the
        // vendor-dependent window, so a non-travel candidate at the fringe
        // simply earns a zero date score.
        let window = Duration::days(self.config.date.widest_window());
        let date_from = date - window;
        let date_to = date + window;

        let tolerance = self.config.amount.tolerance_for(amount);
        let amount_min = (amount - tolerance).max(0.0);
        let amount_max = amount + tolerance;

        let owner = receipt.owner.as_str();
        let mut candidates: Vec<CandidateRecord> = Vec::new();
        for tx in
            self.db
                .candidate_transactions(owner, date_from, date_to, amount_min, amount_max)?
        {
            candidates.push(CandidateRecord::Individual(tx));
        }
        for group in self
            .db
            .candidate_groups(owner, date_from, date_to, amount_min, amount_max)?
        {
            candidates.push(CandidateRecord::Group(group));
        }

        Ok(candidates)
    }

    /// Candidates scored and ranked for selection and for the review UI.
    /// Zero-confidence pairs are dropped; on equal confidence a group ranks
    /// ahead of an individual transaction.
    pub fn scored_for_receipt(&self, receipt: &Receipt) -> Result<Vec<ScoredCandidate>> {
        let scorer = MatchScorer::new(self.config);

        let mut scored: Vec<ScoredCandidate> = self
            .find_for_receipt(receipt)?
            .into_iter()
            .map(|candidate| {
                let breakdown = scorer.score(receipt, &candidate);
                ScoredCandidate {
                    candidate,
                    breakdown,
                }
            })
            .filter(|c| c.breakdown.confidence_score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.breakdown
                .confidence_score
                .partial_cmp(&a.breakdown.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| rank(a.candidate.kind()).cmp(&rank(b.candidate.kind())))
        });
        scored.truncate(self.config.selection.max_candidates);

        Ok(scored)
    }
}

/// Tie-break order: a group reconciles multiple real charges and is the
/// more informative match, so it sorts first.
fn rank(kind: CandidateKind) -> u8 {
    match kind {
        CandidateKind::Group => 0,
        CandidateKind::Individual => 1,
    }
}

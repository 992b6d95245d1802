//! Proposal selection for one receipt
//!
//! Scores the finder's candidates, applies the tie-break and threshold
//! policy, and writes at most one proposal. The proposal moves the receipt
//! to Proposed; the transaction/group is only advanced by confirm.

use std::time::Instant;

use tracing::debug;

use crate::candidates::CandidateFinder;
use crate::config::MatchingConfig;
use crate::db::Database;
use crate::error::Result;
use crate::models::{CandidateKind, NewMatch, Receipt};

/// What one selection attempt produced
#[derive(Debug, Clone, Default)]
pub struct ProposalOutcome {
    /// Id of the written proposal, if one cleared the bar
    pub match_id: Option<i64>,
    /// Kind of the winning candidate
    pub kind: Option<CandidateKind>,
    /// A runner-up landed inside the ambiguity delta (observability only;
    /// the winner is still proposed)
    pub ambiguous: bool,
    /// The attempt blew its time budget and wrote nothing
    pub timed_out: bool,
}

/// Selects and writes proposals
pub struct ProposalSelector<'a> {
    db: &'a Database,
    config: &'a MatchingConfig,
}

impl<'a> ProposalSelector<'a> {
    pub fn new(db: &'a Database, config: &'a MatchingConfig) -> Self {
        Self { db, config }
    }

    /// Attempt a proposal for one unmatched receipt. `deadline` bounds the
    /// attempt: once passed, nothing is written and the outcome reports a
    /// timeout (the caller records it; the run continues).
    pub fn propose(&self, receipt: &Receipt, deadline: Option<Instant>) -> Result<ProposalOutcome> {
        let finder = CandidateFinder::new(self.db, self.config);
        let scored = finder.scored_for_receipt(receipt)?;

        let Some(best) = scored.first() else {
            debug!(receipt_id = receipt.id, "no candidates in window");
            return Ok(ProposalOutcome::default());
        };

        // A proposal needs real amount agreement; date and vendor alone are
        // not enough to put a match in front of a reviewer.
        if best.breakdown.amount_score <= 0.0
            || best.breakdown.confidence_score < self.config.selection.min_confidence
        {
            debug!(
                receipt_id = receipt.id,
                confidence = best.breakdown.confidence_score,
                "best candidate below proposal threshold"
            );
            return Ok(ProposalOutcome::default());
        }

        let ambiguous = scored.get(1).is_some_and(|second| {
            best.breakdown.confidence_score - second.breakdown.confidence_score
                <= self.config.selection.ambiguity_delta
        });

        if deadline.is_some_and(|d| Instant::now() > d) {
            return Ok(ProposalOutcome {
                timed_out: true,
                ..Default::default()
            });
        }

        let match_id = self.db.record_proposal(&NewMatch {
            owner: receipt.owner.clone(),
            receipt_id: receipt.id,
            target: best.candidate.target(),
            breakdown: best.breakdown.clone(),
            is_manual: false,
        })?;

        debug!(
            receipt_id = receipt.id,
            match_id,
            target = %best.candidate.target(),
            confidence = best.breakdown.confidence_score,
            ambiguous,
            "proposal written"
        );

        Ok(ProposalOutcome {
            match_id: Some(match_id),
            kind: Some(best.candidate.kind()),
            ambiguous,
            timed_out: false,
        })
    }
}

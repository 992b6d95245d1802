//! Database and matching engine tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rusqlite::params;

    use crate::candidates::CandidateFinder;
    use crate::config::MatchingConfig;
    use crate::error::Error;
    use crate::lifecycle::MatchLifecycle;
    use crate::locks::{CancelFlag, OwnerLocks};
    use crate::orchestrator::AutoMatchOrchestrator;
    use crate::selector::ProposalSelector;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_receipt(
        db: &Database,
        owner: &str,
        amount: Option<f64>,
        day: Option<NaiveDate>,
        vendor: Option<&str>,
    ) -> i64 {
        db.create_receipt(&NewReceipt {
            owner: owner.to_string(),
            amount,
            receipt_date: day,
            vendor: vendor.map(|v| v.to_string()),
        })
        .unwrap()
    }

    fn add_tx(db: &Database, owner: &str, amount: f64, day: NaiveDate, description: &str) -> i64 {
        db.create_transaction(&NewTransaction {
            owner: owner.to_string(),
            amount,
            transaction_date: day,
            description: description.to_string(),
        })
        .unwrap()
    }

    fn must_get_receipt(db: &Database, id: i64) -> Receipt {
        db.get_receipt(id).unwrap().unwrap()
    }

    fn must_get_tx(db: &Database, id: i64) -> Transaction {
        db.get_transaction(id).unwrap().unwrap()
    }

    fn must_get_group(db: &Database, id: i64) -> TransactionGroup {
        db.get_group(id).unwrap().unwrap()
    }

    // ========== Schema / CRUD ==========

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        let receipts = db.list_receipts("alice", None).unwrap();
        assert!(receipts.is_empty());
    }

    #[test]
    fn test_receipt_crud() {
        let db = Database::in_memory().unwrap();

        let id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let receipt = must_get_receipt(&db, id);
        assert_eq!(receipt.owner, "alice");
        assert_eq!(receipt.amount, Some(50.0));
        assert_eq!(receipt.receipt_date, Some(date(2025, 1, 10)));
        assert_eq!(receipt.vendor.as_deref(), Some("TWILIO"));
        assert_eq!(receipt.match_status, MatchStatus::Unmatched);

        // Status filter
        let unmatched = db
            .list_receipts("alice", Some(MatchStatus::Unmatched))
            .unwrap();
        assert_eq!(unmatched.len(), 1);
        let matched = db.list_receipts("alice", Some(MatchStatus::Matched)).unwrap();
        assert!(matched.is_empty());

        // Other owners see nothing
        assert!(db.list_receipts("bob", None).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_crud() {
        let db = Database::in_memory().unwrap();

        let id = add_tx(&db, "alice", -45.5, date(2025, 1, 10), "TWILIO INDIVIDUAL");
        let tx = must_get_tx(&db, id);
        assert_eq!(tx.amount, -45.5);
        assert_eq!(tx.group_id, None);
        assert_eq!(tx.match_status, MatchStatus::Unmatched);

        assert_eq!(db.list_transactions("alice", None).unwrap().len(), 1);
        assert!(db.get_transaction(9999).unwrap().is_none());
    }

    #[test]
    fn test_group_creation_sums_members() {
        let db = Database::in_memory().unwrap();

        let t1 = add_tx(&db, "alice", -20.0, date(2025, 1, 8), "TWILIO");
        let t2 = add_tx(&db, "alice", -15.0, date(2025, 1, 9), "TWILIO");
        let t3 = add_tx(&db, "alice", -15.0, date(2025, 1, 10), "TWILIO");

        let group_id = db.create_group("alice", &[t1, t2, t3]).unwrap();
        let group = must_get_group(&db, group_id);
        assert_eq!(group.combined_amount, 50.0);
        assert_eq!(group.display_date, date(2025, 1, 10));
        assert_eq!(group.transaction_count, 3);
        assert_eq!(group.description, "TWILIO");
        assert_eq!(group.match_status, MatchStatus::Unmatched);

        // Members now carry the group id
        for id in [t1, t2, t3] {
            assert_eq!(must_get_tx(&db, id).group_id, Some(group_id));
        }
        assert_eq!(db.group_members(group_id).unwrap().len(), 3);
    }

    #[test]
    fn test_group_requires_two_members() {
        let db = Database::in_memory().unwrap();
        let t1 = add_tx(&db, "alice", -20.0, date(2025, 1, 8), "TWILIO");
        assert!(matches!(
            db.create_group("alice", &[t1]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_group_rejects_foreign_grouped_or_matched_members() {
        let db = Database::in_memory().unwrap();

        let t1 = add_tx(&db, "alice", -20.0, date(2025, 1, 8), "TWILIO");
        let t2 = add_tx(&db, "alice", -15.0, date(2025, 1, 9), "TWILIO");
        let bob_tx = add_tx(&db, "bob", -15.0, date(2025, 1, 9), "TWILIO");

        assert!(matches!(
            db.create_group("alice", &[t1, bob_tx]),
            Err(Error::Validation(_))
        ));

        // Grouped members cannot be grouped again
        db.create_group("alice", &[t1, t2]).unwrap();
        let t3 = add_tx(&db, "alice", -5.0, date(2025, 1, 9), "TWILIO");
        assert!(matches!(
            db.create_group("alice", &[t1, t3]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_delete_group_releases_members() {
        let db = Database::in_memory().unwrap();

        let t1 = add_tx(&db, "alice", -20.0, date(2025, 1, 8), "TWILIO");
        let t2 = add_tx(&db, "alice", -15.0, date(2025, 1, 9), "TWILIO");
        let group_id = db.create_group("alice", &[t1, t2]).unwrap();

        db.delete_group(group_id).unwrap();
        assert!(db.get_group(group_id).unwrap().is_none());
        assert_eq!(must_get_tx(&db, t1).group_id, None);
        assert_eq!(must_get_tx(&db, t2).group_id, None);
    }

    #[test]
    fn test_delete_group_refused_while_matched() {
        let db = Database::in_memory().unwrap();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let t1 = add_tx(&db, "alice", -20.0, date(2025, 1, 8), "TWILIO");
        let t2 = add_tx(&db, "alice", -30.0, date(2025, 1, 9), "TWILIO");
        let group_id = db.create_group("alice", &[t1, t2]).unwrap();
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 9)), Some("TWILIO"));

        lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Group(group_id))
            .unwrap();

        assert!(matches!(
            db.delete_group(group_id),
            Err(Error::Validation(_))
        ));
    }

    // ========== Candidate discovery ==========

    #[test]
    fn test_grouped_transactions_never_individual_candidates() {
        // A grouped transaction must not surface individually even on an
        // exact amount/date hit; it is only reachable through its group.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        let t1 = add_tx(&db, "alice", -25.0, date(2025, 1, 10), "TWILIO");
        let t2 = add_tx(&db, "alice", -25.0, date(2025, 1, 10), "TWILIO");
        db.create_group("alice", &[t1, t2]).unwrap();

        let receipt_id = add_receipt(&db, "alice", Some(25.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let receipt = must_get_receipt(&db, receipt_id);

        let finder = CandidateFinder::new(&db, &config);
        let candidates = finder.find_for_receipt(&receipt).unwrap();
        assert!(candidates
            .iter()
            .all(|c| !matches!(c, CandidateRecord::Individual(_))));
    }

    #[test]
    fn test_candidates_exclude_live_matched_targets() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let tx_id = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        let r1 = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        lifecycle
            .create_manual_match("alice", r1, MatchTarget::Transaction(tx_id))
            .unwrap();

        // A proposal does not advance the transaction's status, but it must
        // still take the transaction off the candidate market.
        assert_eq!(must_get_tx(&db, tx_id).match_status, MatchStatus::Unmatched);

        let r2 = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let finder = CandidateFinder::new(&db, &config);
        let candidates = finder.find_for_receipt(&must_get_receipt(&db, r2)).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_candidates_empty_for_unscorable_receipt() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        let no_amount = add_receipt(&db, "alice", None, Some(date(2025, 1, 10)), Some("TWILIO"));
        let no_date = add_receipt(&db, "alice", Some(50.0), None, Some("TWILIO"));

        let finder = CandidateFinder::new(&db, &config);
        assert!(finder
            .find_for_receipt(&must_get_receipt(&db, no_amount))
            .unwrap()
            .is_empty());
        assert!(finder
            .find_for_receipt(&must_get_receipt(&db, no_date))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_candidate_windows_filter_amount_and_date() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        let in_window = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        add_tx(&db, "alice", -200.0, date(2025, 1, 10), "TWILIO"); // amount out
        add_tx(&db, "alice", -50.0, date(2025, 3, 1), "TWILIO"); // date out
        add_tx(&db, "bob", -50.0, date(2025, 1, 10), "TWILIO"); // other owner

        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let finder = CandidateFinder::new(&db, &config);
        let candidates = finder
            .find_for_receipt(&must_get_receipt(&db, receipt_id))
            .unwrap();

        assert_eq!(candidates.len(), 1);
        match &candidates[0] {
            CandidateRecord::Individual(tx) => assert_eq!(tx.id, in_window),
            other => panic!("unexpected candidate: {:?}", other),
        }
    }

    #[test]
    fn test_scored_candidates_ranked_with_group_tie_break() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        // Individual and group with identical amount/date/vendor: equal
        // confidence, group must rank first.
        let solo = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "ACME SUPPLY");
        let m1 = add_tx(&db, "alice", -20.0, date(2025, 1, 10), "ACME SUPPLY");
        let m2 = add_tx(&db, "alice", -30.0, date(2025, 1, 10), "ACME SUPPLY");
        let group_id = db.create_group("alice", &[m1, m2]).unwrap();

        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("ACME SUPPLY"));
        let finder = CandidateFinder::new(&db, &config);
        let scored = finder
            .scored_for_receipt(&must_get_receipt(&db, receipt_id))
            .unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(
            scored[0].breakdown.confidence_score,
            scored[1].breakdown.confidence_score
        );
        match &scored[0].candidate {
            CandidateRecord::Group(g) => assert_eq!(g.id, group_id),
            other => panic!("group should win the tie, got {:?}", other),
        }
        match &scored[1].candidate {
            CandidateRecord::Individual(tx) => assert_eq!(tx.id, solo),
            other => panic!("unexpected runner-up: {:?}", other),
        }
    }

    // ========== Proposal selection ==========

    #[test]
    fn test_selector_prefers_exact_amount_group() {
        // Spec scenario: $50 receipt vs a $50 group and a $45.50 standalone
        // transaction on the same day -> the group is proposed.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        add_tx(&db, "alice", -45.5, date(2025, 1, 10), "TWILIO INDIVIDUAL");
        let m1 = add_tx(&db, "alice", -20.0, date(2025, 1, 10), "TWILIO");
        let m2 = add_tx(&db, "alice", -15.0, date(2025, 1, 10), "TWILIO");
        let m3 = add_tx(&db, "alice", -15.0, date(2025, 1, 10), "TWILIO");
        let group_id = db.create_group("alice", &[m1, m2, m3]).unwrap();

        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let selector = ProposalSelector::new(&db, &config);
        let outcome = selector
            .propose(&must_get_receipt(&db, receipt_id), None)
            .unwrap();

        assert_eq!(outcome.kind, Some(CandidateKind::Group));
        let m = db.get_match(outcome.match_id.unwrap()).unwrap().unwrap();
        assert_eq!(m.target, MatchTarget::Group(group_id));
        assert_eq!(m.state, MatchState::Proposed);
        assert!(!m.is_manual);
        assert!(m.confidence_score >= config.selection.min_confidence);

        // Receipt moves to Proposed; the group is NOT advanced until confirm
        assert_eq!(
            must_get_receipt(&db, receipt_id).match_status,
            MatchStatus::Proposed
        );
        assert_eq!(
            must_get_group(&db, group_id).match_status,
            MatchStatus::Unmatched
        );
    }

    #[test]
    fn test_selector_skips_below_threshold() {
        // Amount inside tolerance but off, date outside the non-travel
        // window, vendor unrelated: the sum cannot clear min_confidence.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        add_tx(&db, "alice", -48.0, date(2025, 1, 15), "HARDWARE DEPOT");
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("STARBUCKS"));

        let selector = ProposalSelector::new(&db, &config);
        let outcome = selector
            .propose(&must_get_receipt(&db, receipt_id), None)
            .unwrap();

        assert!(outcome.match_id.is_none());
        assert_eq!(
            must_get_receipt(&db, receipt_id).match_status,
            MatchStatus::Unmatched
        );
    }

    #[test]
    fn test_selector_flags_ambiguous_runner_up() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        // Two identical standalone transactions: winner and runner-up tie.
        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");

        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let selector = ProposalSelector::new(&db, &config);
        let outcome = selector
            .propose(&must_get_receipt(&db, receipt_id), None)
            .unwrap();

        assert!(outcome.match_id.is_some());
        assert!(outcome.ambiguous);
    }

    // ========== Lifecycle ==========

    fn propose_individual(db: &Database, config: &MatchingConfig, owner: &str) -> (i64, i64, i64) {
        let tx_id = add_tx(db, owner, -50.0, date(2025, 1, 10), "TWILIO");
        let receipt_id = add_receipt(db, owner, Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let selector = ProposalSelector::new(db, config);
        let outcome = selector
            .propose(&must_get_receipt(db, receipt_id), None)
            .unwrap();
        (outcome.match_id.unwrap(), receipt_id, tx_id)
    }

    #[test]
    fn test_confirm_match_advances_all_three_records() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, receipt_id, tx_id) = propose_individual(&db, &config, "alice");

        let confirmed = lifecycle.confirm_match(match_id, "alice@example.com").unwrap();
        assert_eq!(confirmed.state, MatchState::Confirmed);
        assert_eq!(confirmed.confirmed_by.as_deref(), Some("alice@example.com"));
        assert!(confirmed.confirmed_at.is_some());

        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Matched);
        assert_eq!(must_get_tx(&db, tx_id).match_status, MatchStatus::Matched);
    }

    #[test]
    fn test_confirm_group_match_records_receipt_id() {
        let db = Database::in_memory().unwrap();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let m1 = add_tx(&db, "alice", -20.0, date(2025, 1, 10), "TWILIO");
        let m2 = add_tx(&db, "alice", -30.0, date(2025, 1, 10), "TWILIO");
        let group_id = db.create_group("alice", &[m1, m2]).unwrap();
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        let m = lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Group(group_id))
            .unwrap();
        lifecycle.confirm_match(m.id, "alice@example.com").unwrap();

        let group = must_get_group(&db, group_id);
        assert_eq!(group.match_status, MatchStatus::Matched);
        assert_eq!(group.matched_receipt_id, Some(receipt_id));
    }

    #[test]
    fn test_confirm_is_not_idempotent() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, receipt_id, tx_id) = propose_individual(&db, &config, "alice");
        lifecycle.confirm_match(match_id, "alice@example.com").unwrap();

        // Confirming again fails with InvalidState and mutates nothing
        assert!(matches!(
            lifecycle.confirm_match(match_id, "eve@example.com"),
            Err(Error::InvalidState(_))
        ));
        let m = db.get_match(match_id).unwrap().unwrap();
        assert_eq!(m.state, MatchState::Confirmed);
        assert_eq!(m.confirmed_by.as_deref(), Some("alice@example.com"));
        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Matched);
        assert_eq!(must_get_tx(&db, tx_id).match_status, MatchStatus::Matched);
    }

    #[test]
    fn test_confirm_unknown_match_is_not_found() {
        let db = Database::in_memory().unwrap();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);
        assert!(matches!(
            lifecycle.confirm_match(424242, "alice@example.com"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_reject_proposed_match_reverts_both_sides() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, receipt_id, tx_id) = propose_individual(&db, &config, "alice");
        let rejected = lifecycle.reject_match(match_id).unwrap();

        assert_eq!(rejected.state, MatchState::Rejected);
        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Unmatched);
        assert_eq!(must_get_tx(&db, tx_id).match_status, MatchStatus::Unmatched);

        // The transaction is back on the market for a compatible receipt
        let finder = CandidateFinder::new(&db, &config);
        let r2 = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        let candidates = finder.find_for_receipt(&must_get_receipt(&db, r2)).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_reject_confirmed_group_match_clears_receipt_link() {
        // Spec scenario: confirmed group match, then reject -> receipt and
        // group both Unmatched, matched_receipt_id cleared, group candidate
        // again.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let m1 = add_tx(&db, "alice", -20.0, date(2025, 1, 10), "TWILIO");
        let m2 = add_tx(&db, "alice", -30.0, date(2025, 1, 10), "TWILIO");
        let group_id = db.create_group("alice", &[m1, m2]).unwrap();
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        let m = lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Group(group_id))
            .unwrap();
        lifecycle.confirm_match(m.id, "alice@example.com").unwrap();
        lifecycle.reject_match(m.id).unwrap();

        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Unmatched);
        let group = must_get_group(&db, group_id);
        assert_eq!(group.match_status, MatchStatus::Unmatched);
        assert_eq!(group.matched_receipt_id, None);

        let finder = CandidateFinder::new(&db, &config);
        let candidates = finder
            .find_for_receipt(&must_get_receipt(&db, receipt_id))
            .unwrap();
        assert!(candidates
            .iter()
            .any(|c| matches!(c, CandidateRecord::Group(g) if g.id == group_id)));
    }

    #[test]
    fn test_rejected_match_stays_rejected() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, _, _) = propose_individual(&db, &config, "alice");
        lifecycle.reject_match(match_id).unwrap();

        assert!(matches!(
            lifecycle.reject_match(match_id),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            lifecycle.confirm_match(match_id, "alice@example.com"),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_manual_match_round_trip() {
        // CreateManualMatch -> Reject returns both records to Unmatched and
        // the transaction reappears in candidate lookups.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let tx_id = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        let m = lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Transaction(tx_id))
            .unwrap();
        assert_eq!(m.state, MatchState::Proposed);
        assert!(m.is_manual);
        assert_eq!(m.confidence_score, 0.0);
        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Proposed);

        lifecycle.reject_match(m.id).unwrap();
        assert_eq!(must_get_receipt(&db, receipt_id).match_status, MatchStatus::Unmatched);
        assert_eq!(must_get_tx(&db, tx_id).match_status, MatchStatus::Unmatched);

        let finder = CandidateFinder::new(&db, &config);
        let candidates = finder
            .find_for_receipt(&must_get_receipt(&db, receipt_id))
            .unwrap();
        assert!(candidates
            .iter()
            .any(|c| matches!(c, CandidateRecord::Individual(t) if t.id == tx_id)));
    }

    #[test]
    fn test_manual_match_validations() {
        let db = Database::in_memory().unwrap();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let tx_id = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        let receipt_id = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        // Unknown ids
        assert!(matches!(
            lifecycle.create_manual_match("alice", 9999, MatchTarget::Transaction(tx_id)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            lifecycle.create_manual_match("alice", receipt_id, MatchTarget::Group(9999)),
            Err(Error::NotFound(_))
        ));

        // Grouped transaction is not an individual target
        let m1 = add_tx(&db, "alice", -20.0, date(2025, 1, 10), "TWILIO");
        let m2 = add_tx(&db, "alice", -30.0, date(2025, 1, 10), "TWILIO");
        db.create_group("alice", &[m1, m2]).unwrap();
        assert!(matches!(
            lifecycle.create_manual_match("alice", receipt_id, MatchTarget::Transaction(m1)),
            Err(Error::Validation(_))
        ));

        // Target already spoken for by another receipt's proposal
        lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Transaction(tx_id))
            .unwrap();
        let r2 = add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        assert!(matches!(
            lifecycle.create_manual_match("alice", r2, MatchTarget::Transaction(tx_id)),
            Err(Error::Validation(_))
        ));

        // Receipt already proposed cannot take a second manual match
        let t2 = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        assert!(matches!(
            lifecycle.create_manual_match("alice", receipt_id, MatchTarget::Transaction(t2)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_receipt_has_at_most_one_live_match() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, receipt_id, _) = propose_individual(&db, &config, "alice");
        assert_eq!(
            db.active_match_for_receipt(receipt_id).unwrap().unwrap().id,
            match_id
        );

        // After reject the slot frees up and a new match can be created
        lifecycle.reject_match(match_id).unwrap();
        assert!(db.active_match_for_receipt(receipt_id).unwrap().is_none());

        let t2 = add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        let m2 = lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Transaction(t2))
            .unwrap();
        assert_eq!(
            db.active_match_for_receipt(receipt_id).unwrap().unwrap().id,
            m2.id
        );
    }

    // ========== Batch approve ==========

    #[test]
    fn test_batch_approve_filters_and_skips() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (m_high, _, tx_high) = propose_individual(&db, &config, "alice");
        let (m_drifted, _, tx_drifted) = propose_individual(&db, &config, "alice");
        let (_m_manual_low, r3, t3) = {
            let tx_id = add_tx(&db, "alice", -12.0, date(2025, 1, 20), "GODADDY");
            let receipt_id = add_receipt(&db, "alice", Some(12.0), Some(date(2025, 1, 20)), Some("GODADDY"));
            let m = lifecycle
                .create_manual_match("alice", receipt_id, MatchTarget::Transaction(tx_id))
                .unwrap();
            (m.id, receipt_id, tx_id)
        };

        // Simulate drift: someone consumed this target outside the proposal
        db.conn()
            .unwrap()
            .execute(
                "UPDATE transactions SET match_status = 'matched' WHERE id = ?",
                params![tx_drifted],
            )
            .unwrap();

        // Manual match has confidence 0 and sits below the floor
        let summary = lifecycle
            .batch_approve("alice", 50.0, "approver@example.com", &CancelFlag::new())
            .unwrap();

        assert_eq!(summary.approved, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            db.get_match(m_high).unwrap().unwrap().state,
            MatchState::Confirmed
        );
        assert_eq!(must_get_tx(&db, tx_high).match_status, MatchStatus::Matched);
        assert_eq!(
            db.get_match(m_drifted).unwrap().unwrap().state,
            MatchState::Proposed
        );

        // The low-confidence manual proposal was never touched
        assert_eq!(must_get_receipt(&db, r3).match_status, MatchStatus::Proposed);
        assert_eq!(must_get_tx(&db, t3).match_status, MatchStatus::Unmatched);
    }

    #[test]
    fn test_batch_approve_honors_cancellation() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (match_id, _, _) = propose_individual(&db, &config, "alice");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let summary = lifecycle
            .batch_approve("alice", 0.0, "approver@example.com", &cancel)
            .unwrap();

        assert_eq!(summary.approved, 0);
        assert_eq!(
            db.get_match(match_id).unwrap().unwrap().state,
            MatchState::Proposed
        );
    }

    // ========== Orchestrator ==========

    #[test]
    fn test_auto_match_run_counts_group_and_individual() {
        // Spec scenario 1 end to end: the $50 group wins over the $45.50
        // standalone transaction; groupMatchCount increments, the
        // transaction counter does not.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();

        add_tx(&db, "alice", -45.5, date(2025, 1, 10), "TWILIO INDIVIDUAL");
        let m1 = add_tx(&db, "alice", -25.0, date(2025, 1, 10), "TWILIO");
        let m2 = add_tx(&db, "alice", -25.0, date(2025, 1, 10), "TWILIO");
        db.create_group("alice", &[m1, m2]).unwrap();
        add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        // A second receipt with nothing to match against
        add_receipt(&db, "alice", Some(999.0), Some(date(2025, 6, 1)), Some("DELL"));

        let orchestrator = AutoMatchOrchestrator::new(&db, &config, &locks);
        let summary = orchestrator.run_for_owner("alice", &CancelFlag::new()).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.proposed, 1);
        assert_eq!(summary.group_matches, 1);
        assert_eq!(summary.transaction_matches, 0);
        assert_eq!(summary.failed, 0);

        // The run is persisted with its counters
        let runs = db.list_match_runs("alice", 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].summary.proposed, 1);
        assert!(runs[0].finished_at.is_some());
    }

    #[test]
    fn test_auto_match_skips_unscorable_receipts_silently() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();

        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        add_receipt(&db, "alice", None, Some(date(2025, 1, 10)), Some("TWILIO"));

        let orchestrator = AutoMatchOrchestrator::new(&db, &config, &locks);
        let summary = orchestrator.run_for_owner("alice", &CancelFlag::new()).unwrap();

        // Missing amount is degradation, not an error
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.proposed, 0);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_auto_match_cancelled_before_start() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();

        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let orchestrator = AutoMatchOrchestrator::new(&db, &config, &locks);
        let summary = orchestrator.run_for_owner("alice", &cancel).unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.proposed, 0);
        let runs = db.list_match_runs("alice", 10).unwrap();
        assert_eq!(runs[0].status, "cancelled");
    }

    #[test]
    fn test_run_all_sweeps_owners_sequentially() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();

        add_tx(&db, "alice", -50.0, date(2025, 1, 10), "TWILIO");
        add_receipt(&db, "alice", Some(50.0), Some(date(2025, 1, 10)), Some("TWILIO"));
        add_tx(&db, "bob", -30.0, date(2025, 2, 1), "GODADDY");
        add_receipt(&db, "bob", Some(30.0), Some(date(2025, 2, 1)), Some("GODADDY"));

        let orchestrator = AutoMatchOrchestrator::new(&db, &config, &locks);
        let results = orchestrator.run_all(&CancelFlag::new()).unwrap();

        assert_eq!(results.len(), 2);
        let owners: Vec<&str> = results.iter().map(|(o, _)| o.as_str()).collect();
        assert_eq!(owners, vec!["alice", "bob"]);
        assert!(results.iter().all(|(_, s)| s.proposed == 1));
    }

    // ========== Cross-cutting invariants ==========

    #[test]
    fn test_bidirectional_consistency_invariant() {
        // After a pile of mixed operations, every confirmed match links two
        // Matched records and every rejected match links Unmatched ones.
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        let (m1, _, _) = propose_individual(&db, &config, "alice");
        let (m2, _, _) = propose_individual(&db, &config, "alice");
        let (m3, _, _) = propose_individual(&db, &config, "bob");
        lifecycle.confirm_match(m1, "alice@example.com").unwrap();
        lifecycle.reject_match(m2).unwrap();
        lifecycle.confirm_match(m3, "bob@example.com").unwrap();
        lifecycle.reject_match(m3).unwrap();

        for owner in ["alice", "bob"] {
            for m in db.list_matches(owner, None).unwrap() {
                let receipt = must_get_receipt(&db, m.receipt_id);
                let target_status = match m.target {
                    MatchTarget::Transaction(id) => must_get_tx(&db, id).match_status,
                    MatchTarget::Group(id) => must_get_group(&db, id).match_status,
                };
                match m.state {
                    MatchState::Confirmed => {
                        assert_eq!(receipt.match_status, MatchStatus::Matched);
                        assert_eq!(target_status, MatchStatus::Matched);
                    }
                    MatchState::Rejected => {
                        assert_eq!(receipt.match_status, MatchStatus::Unmatched);
                        assert_eq!(target_status, MatchStatus::Unmatched);
                    }
                    MatchState::Proposed => {
                        assert_eq!(receipt.match_status, MatchStatus::Proposed);
                        assert_eq!(target_status, MatchStatus::Unmatched);
                    }
                }
            }
        }
    }

    #[test]
    fn test_match_scores_stored_and_summed() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();

        let (match_id, _, _) = propose_individual(&db, &config, "alice");
        let m = db.get_match(match_id).unwrap().unwrap();

        assert!(
            (m.confidence_score - (m.amount_score + m.date_score + m.vendor_score)).abs() < 1e-9
        );
        assert!(m.confidence_score <= config.scale);
        assert!(!m.match_reason.is_empty());
    }

    #[test]
    fn test_review_queue_ordered_by_confidence() {
        let db = Database::in_memory().unwrap();
        let config = MatchingConfig::default();
        let locks = OwnerLocks::new();
        let lifecycle = MatchLifecycle::new(&db, &locks);

        // Strong automatic proposal plus a zero-score manual one
        propose_individual(&db, &config, "alice");
        let tx_id = add_tx(&db, "alice", -70.0, date(2025, 2, 1), "DELL");
        let receipt_id = add_receipt(&db, "alice", Some(70.0), Some(date(2025, 2, 1)), None);
        lifecycle
            .create_manual_match("alice", receipt_id, MatchTarget::Transaction(tx_id))
            .unwrap();

        let queue = db.list_matches("alice", Some(MatchState::Proposed)).unwrap();
        assert_eq!(queue.len(), 2);
        assert!(queue[0].confidence_score >= queue[1].confidence_score);
        assert!(queue[1].is_manual);
    }

    #[test]
    fn test_distinct_owners() {
        let db = Database::in_memory().unwrap();
        add_receipt(&db, "alice", Some(1.0), Some(date(2025, 1, 1)), None);
        add_tx(&db, "bob", -2.0, date(2025, 1, 2), "X");
        add_tx(&db, "alice", -3.0, date(2025, 1, 3), "Y");

        assert_eq!(db.distinct_owners().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_audit_log_round_trip() {
        let db = Database::in_memory().unwrap();
        db.log_audit("alice", "confirm", Some("match"), Some(1), Some("via api"))
            .unwrap();
        db.log_audit("bob", "reject", Some("match"), Some(2), None)
            .unwrap();

        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, "bob");
        assert_eq!(entries[1].action, "confirm");
    }
}

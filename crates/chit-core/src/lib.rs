//! Chit Core Library
//!
//! Shared functionality for the Chit receipt matching engine:
//! - Database access and migrations
//! - Confidence scoring for receipt/candidate pairs
//! - Candidate discovery with tolerance windows and exclusion rules
//! - Proposal selection with group-over-individual tie-breaking
//! - Match lifecycle (confirm, reject, manual, batch approve)
//! - Auto-match orchestration with run history
//! - Per-owner write serialization and cooperative cancellation
//! - Matching calibration config (embedded defaults + override file)

pub mod candidates;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod scoring;
pub mod selector;

pub use candidates::CandidateFinder;
pub use config::MatchingConfig;
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use lifecycle::MatchLifecycle;
pub use locks::{CancelFlag, OwnerLocks};
pub use models::{
    AutoMatchSummary, BatchApproveSummary, CandidateKind, CandidateRecord, Match, MatchRun,
    MatchState, MatchStatus, MatchTarget, NewMatch, NewReceipt, NewTransaction, Receipt,
    ScoreBreakdown, ScoredCandidate, Transaction, TransactionGroup,
};
pub use orchestrator::AutoMatchOrchestrator;
pub use scoring::MatchScorer;
pub use selector::{ProposalOutcome, ProposalSelector};

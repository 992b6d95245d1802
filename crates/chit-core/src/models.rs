//! Domain models for Chit

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a receipt, transaction, or group stands in the matching workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// No live match against this record
    #[default]
    Unmatched,
    /// A proposal exists and is awaiting review
    Proposed,
    /// A confirmed match links this record
    Matched,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Proposed => "proposed",
            Self::Matched => "matched",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unmatched" => Ok(Self::Unmatched),
            "proposed" => Ok(Self::Proposed),
            "matched" => Ok(Self::Matched),
            _ => Err(format!("Unknown match status: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    /// Created by auto-match or a manual request, awaiting confirm/reject
    #[default]
    Proposed,
    /// Accepted; receipt and target are both Matched
    Confirmed,
    /// Terminal; a rejected match is never resurrected
    Rejected,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for MatchState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "proposed" => Ok(Self::Proposed),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown match state: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a match points at. Exactly one target per match; the either/or
/// invariant lives in the type, not in runtime checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MatchTarget {
    Transaction(i64),
    Group(i64),
}

impl MatchTarget {
    /// Build from the nullable pair used at the storage/API boundary.
    /// Both set or neither set is a caller error.
    pub fn from_columns(
        transaction_id: Option<i64>,
        group_id: Option<i64>,
    ) -> std::result::Result<Self, String> {
        match (transaction_id, group_id) {
            (Some(t), None) => Ok(Self::Transaction(t)),
            (None, Some(g)) => Ok(Self::Group(g)),
            (Some(_), Some(_)) => Err("both transaction_id and transaction_group_id set".into()),
            (None, None) => Err("neither transaction_id nor transaction_group_id set".into()),
        }
    }

    /// Split into the nullable pair for SQL binds.
    pub fn into_columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            Self::Transaction(id) => (Some(id), None),
            Self::Group(id) => (None, Some(id)),
        }
    }

    pub fn kind(&self) -> CandidateKind {
        match self {
            Self::Transaction(_) => CandidateKind::Individual,
            Self::Group(_) => CandidateKind::Group,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Transaction(id) | Self::Group(id) => *id,
        }
    }
}

impl std::fmt::Display for MatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transaction(id) => write!(f, "transaction #{}", id),
            Self::Group(id) => write!(f, "group #{}", id),
        }
    }
}

/// Whether a candidate is a standalone transaction or a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Individual,
    Group,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An uploaded receipt with fields extracted upstream (OCR pipeline).
/// Extraction can fail partially, so amount/date/vendor are all optional;
/// a receipt missing amount or date simply never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub owner: String,
    /// Extracted total
    pub amount: Option<f64>,
    /// Extracted purchase date
    pub receipt_date: Option<NaiveDate>,
    /// Extracted vendor name
    pub vendor: Option<String>,
    pub match_status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// New receipt as handed over by the upload/OCR pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReceipt {
    pub owner: String,
    pub amount: Option<f64>,
    pub receipt_date: Option<NaiveDate>,
    pub vendor: Option<String>,
}

/// One bank/card statement line item, as handed over by the import pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub owner: String,
    /// Negative = charge, positive = refund; matching compares magnitudes
    pub amount: f64,
    pub transaction_date: NaiveDate,
    pub description: String,
    /// Set when this transaction belongs to a group; grouped transactions
    /// are only matchable through their group
    pub group_id: Option<i64>,
    pub match_status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// New transaction for registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub owner: String,
    pub amount: f64,
    pub transaction_date: NaiveDate,
    pub description: String,
}

/// Several transactions (same vendor/period) collapsed into one matchable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionGroup {
    pub id: i64,
    pub owner: String,
    /// Representative description, taken from the members at creation
    pub description: String,
    /// Sum of member magnitudes
    pub combined_amount: f64,
    /// Latest member date; what the review UI shows
    pub display_date: NaiveDate,
    pub transaction_count: i64,
    pub match_status: MatchStatus,
    /// Receipt this group is confirmed against, if any
    pub matched_receipt_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A proposed or confirmed link between a receipt and a transaction or group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub owner: String,
    pub receipt_id: i64,
    pub target: MatchTarget,
    pub state: MatchState,
    pub amount_score: f64,
    pub date_score: f64,
    pub vendor_score: f64,
    /// Always amount + date + vendor, capped by the configured scale
    pub confidence_score: f64,
    /// Human-readable summary of which factors drove the score
    pub match_reason: String,
    pub is_manual: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// New match to be written (proposal or manual)
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub owner: String,
    pub receipt_id: i64,
    pub target: MatchTarget,
    pub breakdown: ScoreBreakdown,
    pub is_manual: bool,
}

/// Scoring engine output for one receipt/candidate pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub amount_score: f64,
    pub date_score: f64,
    pub vendor_score: f64,
    pub confidence_score: f64,
    pub reason: String,
}

impl ScoreBreakdown {
    /// The all-zero breakdown used when a receipt cannot be scored
    pub fn zero(reason: &str) -> Self {
        Self {
            amount_score: 0.0,
            date_score: 0.0,
            vendor_score: 0.0,
            confidence_score: 0.0,
            reason: reason.to_string(),
        }
    }
}

/// A matchable record surfaced by candidate discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CandidateRecord {
    Individual(Transaction),
    Group(TransactionGroup),
}

impl CandidateRecord {
    pub fn kind(&self) -> CandidateKind {
        match self {
            Self::Individual(_) => CandidateKind::Individual,
            Self::Group(_) => CandidateKind::Group,
        }
    }

    pub fn target(&self) -> MatchTarget {
        match self {
            Self::Individual(tx) => MatchTarget::Transaction(tx.id),
            Self::Group(g) => MatchTarget::Group(g.id),
        }
    }

    /// Magnitude compared against the receipt total
    pub fn amount(&self) -> f64 {
        match self {
            Self::Individual(tx) => tx.amount.abs(),
            Self::Group(g) => g.combined_amount,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Individual(tx) => tx.transaction_date,
            Self::Group(g) => g.display_date,
        }
    }

    /// Text compared against the receipt vendor
    pub fn name(&self) -> &str {
        match self {
            Self::Individual(tx) => &tx.description,
            Self::Group(g) => &g.description,
        }
    }
}

/// A candidate with its score, as served to the review UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub breakdown: ScoreBreakdown,
}

/// Aggregate result of one auto-match run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoMatchSummary {
    /// Receipts examined
    pub processed: i64,
    /// Proposals written
    pub proposed: i64,
    /// Proposals against individual transactions
    pub transaction_matches: i64,
    /// Proposals against groups
    pub group_matches: i64,
    /// Receipts proposed with a runner-up inside the ambiguity delta
    pub ambiguous: i64,
    /// Receipts whose attempt errored or timed out (recorded, not fatal)
    pub failed: i64,
    pub duration_ms: i64,
}

/// Result of a batch-approve sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchApproveSummary {
    pub approved: i64,
    pub skipped: i64,
}

/// Persisted record of one auto-match run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRun {
    pub id: i64,
    pub owner: String,
    /// running, completed, cancelled
    pub status: String,
    #[serde(flatten)]
    pub summary: AutoMatchSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

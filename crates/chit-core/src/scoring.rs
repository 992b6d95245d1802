//! Confidence scoring for receipt/candidate pairs
//!
//! Pure computation: (receipt, candidate) in, three sub-scores and a
//! combined confidence out. All point values and tolerances come from
//! [`MatchingConfig`]; nothing here touches the database.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::{MatchingConfig, AMOUNT_EPSILON};
use crate::models::{CandidateRecord, Receipt, ScoreBreakdown};

/// Scores one receipt against one candidate
pub struct MatchScorer<'a> {
    config: &'a MatchingConfig,
}

impl<'a> MatchScorer<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    /// Score a pair. A receipt with no extracted amount or date cannot be
    /// matched at all and short-circuits to the all-zero breakdown.
    pub fn score(&self, receipt: &Receipt, candidate: &CandidateRecord) -> ScoreBreakdown {
        let amount = match receipt.amount {
            Some(a) => a.abs(),
            None => return ScoreBreakdown::zero("receipt has no extracted amount"),
        };
        let date = match receipt.receipt_date {
            Some(d) => d,
            None => return ScoreBreakdown::zero("receipt has no extracted date"),
        };

        let (amount_score, amount_note) = self.amount_score(amount, candidate.amount());

        let travel = self.is_travel_vendor(receipt.vendor.as_deref().unwrap_or(""))
            || self.is_travel_vendor(candidate.name());
        let days = (candidate.date() - date).num_days().abs();
        let (date_score, date_note) = self.date_score(days, travel);

        let (vendor_score, vendor_note) =
            self.vendor_score(receipt.vendor.as_deref(), candidate.name());

        let confidence_score =
            (amount_score + date_score + vendor_score).clamp(0.0, self.config.scale);

        ScoreBreakdown {
            amount_score,
            date_score,
            vendor_score,
            confidence_score,
            reason: format!("{}; {}; {}", amount_note, date_note, vendor_note),
        }
    }

    fn amount_score(&self, receipt_amount: f64, candidate_amount: f64) -> (f64, String) {
        let max = self.config.amount.max_points;
        let diff = (receipt_amount - candidate_amount).abs();

        if diff <= AMOUNT_EPSILON {
            return (max, "amount exact".to_string());
        }

        let tolerance = self.config.amount.tolerance_for(receipt_amount);
        if diff <= tolerance {
            // Partial band: 50-90% of the maximum, falling with distance.
            let score = max * (0.9 - 0.4 * (diff / tolerance));
            (score, format!("amount within tolerance (${:.2} off)", diff))
        } else {
            (0.0, format!("amount outside tolerance (${:.2} off)", diff))
        }
    }

    fn date_score(&self, days_apart: i64, travel: bool) -> (f64, String) {
        let max = self.config.date.max_points;
        let window = if travel {
            self.config.date.travel_window_days
        } else {
            self.config.date.window_days
        };

        if days_apart == 0 {
            (max, "same day".to_string())
        } else if days_apart <= window {
            let score = max * (1.0 - days_apart as f64 / (window as f64 + 1.0));
            let note = if travel {
                format!("{} days apart (travel window)", days_apart)
            } else {
                format!("{} days apart", days_apart)
            };
            (score, note)
        } else {
            (0.0, format!("{} days apart, outside window", days_apart))
        }
    }

    fn vendor_score(&self, receipt_vendor: Option<&str>, candidate_name: &str) -> (f64, String) {
        let vendor = match receipt_vendor {
            Some(v) if !v.trim().is_empty() => v,
            _ => return (0.0, "no extracted vendor".to_string()),
        };

        let similarity = vendor_similarity(vendor, candidate_name);
        if similarity < self.config.vendor.min_similarity {
            (0.0, "vendor unrelated".to_string())
        } else if similarity >= 1.0 {
            (self.config.vendor.max_points, "vendor exact".to_string())
        } else {
            (
                self.config.vendor.max_points * similarity,
                format!("vendor {:.0}% similar", similarity * 100.0),
            )
        }
    }

    fn is_travel_vendor(&self, name: &str) -> bool {
        let normalized = normalize_vendor(name);
        normalized
            .split(' ')
            .any(|token| self.config.vendor.travel_keywords.iter().any(|k| k == token))
    }
}

/// Similarity of two vendor strings in [0, 1] after normalization.
/// Exact beats containment beats shared tokens beats raw edit distance.
pub fn vendor_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_vendor(a);
    let b = normalize_vendor(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let edit = levenshtein_similarity(&a, &b);
    if tokens_overlap(&a, &b) {
        edit.max(0.7)
    } else {
        edit
    }
}

/// Lowercase, strip processor prefixes and store numbers, collapse to
/// alphanumeric words. "PAYPAL *TWILIO INC" and "Twilio" normalize to the
/// same thing.
pub fn normalize_vendor(s: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    static STORE_NUMBER: OnceLock<Regex> = OnceLock::new();

    let prefix =
        PREFIX.get_or_init(|| Regex::new(r"^(paypal|sq|tst|dnh|dmi|py)\s*\*?\s*").unwrap());
    let store_number = STORE_NUMBER.get_or_init(|| Regex::new(r"\b[a-z]?-?\d{2,}\b").unwrap());

    let lowered = s.to_lowercase();
    let stripped = prefix.replace(&lowered, "");
    let no_numbers = store_number.replace_all(&stripped, " ");

    no_numbers
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens_overlap(a: &str, b: &str) -> bool {
    // Short words ("of", "co") overlap by accident; skip them.
    let words_a: std::collections::HashSet<&str> =
        a.split(' ').filter(|w| w.len() > 2).collect();
    let words_b: std::collections::HashSet<&str> =
        b.split(' ').filter(|w| w.len() > 2).collect();

    !words_a.is_empty() && words_a.intersection(&words_b).next().is_some()
}

fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

/// Levenshtein edit distance using the two-row O(min(m,n)) space algorithm.
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a = s1.as_bytes();
    let b = s2.as_bytes();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

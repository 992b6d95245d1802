//! Matching workflow commands

use std::path::Path;

use anyhow::{anyhow, Result};

use chit_core::models::{CandidateRecord, MatchTarget};
use chit_core::{
    AutoMatchOrchestrator, CancelFlag, CandidateFinder, MatchLifecycle, MatchingConfig, OwnerLocks,
};

use super::open_db;

/// Run auto-match for one owner or for every owner, with Ctrl-C requesting
/// cancellation after the receipt in flight.
pub async fn cmd_automatch(
    db_path: &Path,
    owner: &str,
    all: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let config = MatchingConfig::load()?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n⏹  Cancelling after the current receipt...");
                cancel.cancel();
            }
        });
    }

    println!("🔍 Running auto-match...");

    let scope = if all { None } else { Some(owner.to_string()) };
    let results = tokio::task::spawn_blocking(move || {
        let locks = OwnerLocks::new();
        let orchestrator = AutoMatchOrchestrator::new(&db, &config, &locks);
        match scope {
            Some(owner) => orchestrator
                .run_for_owner(&owner, &cancel)
                .map(|summary| vec![(owner, summary)]),
            None => orchestrator.run_all(&cancel),
        }
    })
    .await??;

    for (owner, summary) in &results {
        println!("\n  Owner '{}':", owner);
        println!("    Processed:  {}", summary.processed);
        println!(
            "    Proposed:   {} ({} transaction, {} group)",
            summary.proposed, summary.transaction_matches, summary.group_matches
        );
        if summary.ambiguous > 0 {
            println!("    Ambiguous:  {} (review carefully)", summary.ambiguous);
        }
        if summary.failed > 0 {
            println!("    Failed:     {}", summary.failed);
        }
        println!("    Duration:   {} ms", summary.duration_ms);
    }

    println!("\n✅ Auto-match finished");
    Ok(())
}

/// Show scored candidates for one receipt
pub fn cmd_candidates(db_path: &Path, receipt_id: i64, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let config = MatchingConfig::load()?;

    let receipt = db
        .get_receipt(receipt_id)?
        .ok_or_else(|| anyhow!("Receipt #{} not found", receipt_id))?;

    let total = receipt
        .amount
        .map(|a| format!("${:.2}", a))
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "\n🧾 Receipt #{}: {} - {} ({})",
        receipt.id,
        receipt.vendor.as_deref().unwrap_or("Unknown"),
        total,
        receipt
            .receipt_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no date".to_string())
    );
    println!("{}", "─".repeat(70));

    let finder = CandidateFinder::new(&db, &config);
    let candidates = finder.scored_for_receipt(&receipt)?;

    if candidates.is_empty() {
        println!("  No candidates inside the tolerance windows");
        return Ok(());
    }

    for candidate in &candidates {
        let (label, id) = match &candidate.candidate {
            CandidateRecord::Individual(tx) => ("tx", tx.id),
            CandidateRecord::Group(g) => ("group", g.id),
        };
        println!(
            "  {:>5} #{:<5} {:>6.1} pts  {} ${:.2} on {}",
            label,
            id,
            candidate.breakdown.confidence_score,
            candidate.candidate.name(),
            candidate.candidate.amount(),
            candidate.candidate.date()
        );
        println!("         {}", candidate.breakdown.reason);
    }

    println!();
    Ok(())
}

/// Create a manual match against exactly one of transaction/group
pub fn cmd_manual_match(
    db_path: &Path,
    owner: &str,
    receipt_id: i64,
    transaction: Option<i64>,
    group: Option<i64>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let target = MatchTarget::from_columns(transaction, group).map_err(|e| anyhow!(e))?;

    let locks = OwnerLocks::new();
    let lifecycle = MatchLifecycle::new(&db, &locks);
    let m = lifecycle.create_manual_match(owner, receipt_id, target)?;

    println!(
        "✅ Manual match #{} proposed: receipt #{} ↔ {}",
        m.id, m.receipt_id, m.target
    );
    println!("   Confirm with: chit confirm {}", m.id);

    Ok(())
}

pub fn cmd_confirm(
    db_path: &Path,
    owner: &str,
    match_id: i64,
    by: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let locks = OwnerLocks::new();
    let lifecycle = MatchLifecycle::new(&db, &locks);
    let m = lifecycle.confirm_match(match_id, by.unwrap_or(owner))?;

    println!(
        "✅ Match #{} confirmed: receipt #{} ↔ {} ({:.1} pts)",
        m.id, m.receipt_id, m.target, m.confidence_score
    );

    Ok(())
}

pub fn cmd_reject(db_path: &Path, match_id: i64, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let locks = OwnerLocks::new();
    let lifecycle = MatchLifecycle::new(&db, &locks);
    let m = lifecycle.reject_match(match_id)?;

    println!(
        "✅ Match #{} rejected: receipt #{} and {} are unmatched again",
        m.id, m.receipt_id, m.target
    );

    Ok(())
}

pub fn cmd_approve(
    db_path: &Path,
    owner: &str,
    min_confidence: f64,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let locks = OwnerLocks::new();
    let lifecycle = MatchLifecycle::new(&db, &locks);
    let summary = lifecycle.batch_approve(owner, min_confidence, owner, &CancelFlag::new())?;

    println!(
        "✅ Batch approve (≥ {:.0} pts): {} approved, {} skipped",
        min_confidence, summary.approved, summary.skipped
    );

    Ok(())
}

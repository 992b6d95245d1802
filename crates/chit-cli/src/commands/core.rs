//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Status summary and recent runs

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chit_core::db::Database;
use chit_core::models::{MatchState, MatchStatus};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow!("Database path is not valid UTF-8"))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register records: chit add-receipt / chit add-transaction");
    println!("  2. Propose matches:  chit automatch");
    println!("  3. Review proposals: chit candidates / chit confirm");

    Ok(())
}

pub fn cmd_status(db_path: &Path, owner: &str, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    println!("\n📊 Chit status for '{}'", owner);
    println!("{}", "─".repeat(60));

    let receipts = db.list_receipts(owner, None)?;
    let unmatched = receipts
        .iter()
        .filter(|r| r.match_status == MatchStatus::Unmatched)
        .count();
    let proposed = receipts
        .iter()
        .filter(|r| r.match_status == MatchStatus::Proposed)
        .count();
    let matched = receipts
        .iter()
        .filter(|r| r.match_status == MatchStatus::Matched)
        .count();
    println!(
        "  Receipts:     {} total ({} unmatched, {} proposed, {} matched)",
        receipts.len(),
        unmatched,
        proposed,
        matched
    );

    let transactions = db.list_transactions(owner, None)?;
    let grouped = transactions.iter().filter(|t| t.group_id.is_some()).count();
    println!(
        "  Transactions: {} total ({} grouped)",
        transactions.len(),
        grouped
    );

    let groups = db.list_groups(owner, None)?;
    println!("  Groups:       {}", groups.len());

    let queue = db.list_matches(owner, Some(MatchState::Proposed))?;
    println!("  Review queue: {} proposal(s)", queue.len());

    let runs = db.list_match_runs(owner, 5)?;
    if !runs.is_empty() {
        println!("\n  Recent auto-match runs:");
        for run in &runs {
            println!(
                "    #{:<4} {:<10} processed={} proposed={} ambiguous={} failed={} ({} ms)",
                run.id,
                run.status,
                run.summary.processed,
                run.summary.proposed,
                run.summary.ambiguous,
                run.summary.failed,
                run.summary.duration_ms
            );
        }
    }

    println!();
    Ok(())
}

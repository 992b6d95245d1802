//! Record registration commands
//!
//! These are the CLI ingress points standing in for the upstream pipelines:
//! receipts arrive with fields already extracted, transactions as parsed
//! statement lines.

use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use chit_core::models::{NewReceipt, NewTransaction};

use super::open_db;

pub fn cmd_add_receipt(
    db_path: &Path,
    owner: &str,
    amount: Option<f64>,
    date: Option<NaiveDate>,
    vendor: Option<String>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let id = db.create_receipt(&NewReceipt {
        owner: owner.to_string(),
        amount,
        receipt_date: date,
        vendor: vendor.clone(),
    })?;

    let total = amount
        .map(|a| format!("${:.2}", a))
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "✅ Receipt #{} registered: {} - {} ({})",
        id,
        vendor.as_deref().unwrap_or("Unknown"),
        total,
        date.map(|d| d.to_string())
            .unwrap_or_else(|| "no date".to_string())
    );
    if amount.is_none() || date.is_none() {
        println!("   ⚠️  Missing amount/date: this receipt will not auto-match");
    }

    Ok(())
}

pub fn cmd_add_transaction(
    db_path: &Path,
    owner: &str,
    amount: f64,
    date: NaiveDate,
    description: &str,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let id = db.create_transaction(&NewTransaction {
        owner: owner.to_string(),
        amount,
        transaction_date: date,
        description: description.to_string(),
    })?;

    println!(
        "✅ Transaction #{} registered: {} ${:.2} on {}",
        id,
        description,
        amount.abs(),
        date
    );

    Ok(())
}

pub fn cmd_group(
    db_path: &Path,
    owner: &str,
    transaction_ids: &[i64],
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let group_id = db.create_group(owner, transaction_ids)?;
    let group = db
        .get_group(group_id)?
        .ok_or_else(|| anyhow!("group missing after creation"))?;

    println!(
        "✅ Group #{} created: {} - ${:.2} across {} transaction(s), shown as {}",
        group_id,
        group.description,
        group.combined_amount,
        group.transaction_count,
        group.display_date
    );

    Ok(())
}

//! Chit CLI - Receipt-to-transaction matching
//!
//! Usage:
//!   chit init                    Initialize database
//!   chit add-receipt --amount 50 --date 2025-01-10 --vendor TWILIO
//!   chit add-transaction --amount -50 --date 2025-01-10 --description "TWILIO"
//!   chit automatch               Propose matches for unmatched receipts
//!   chit confirm 1               Confirm a proposal
//!   chit serve --port 3000       Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, &cli.owner, cli.no_encrypt),
        Commands::AddReceipt {
            amount,
            date,
            vendor,
        } => commands::cmd_add_receipt(&cli.db, &cli.owner, amount, date, vendor, cli.no_encrypt),
        Commands::AddTransaction {
            amount,
            date,
            description,
        } => commands::cmd_add_transaction(
            &cli.db,
            &cli.owner,
            amount,
            date,
            &description,
            cli.no_encrypt,
        ),
        Commands::Group { transaction_ids } => {
            commands::cmd_group(&cli.db, &cli.owner, &transaction_ids, cli.no_encrypt)
        }
        Commands::Automatch { all } => {
            commands::cmd_automatch(&cli.db, &cli.owner, all, cli.no_encrypt).await
        }
        Commands::Candidates { receipt_id } => {
            commands::cmd_candidates(&cli.db, receipt_id, cli.no_encrypt)
        }
        Commands::Match {
            receipt_id,
            transaction,
            group,
        } => commands::cmd_manual_match(
            &cli.db,
            &cli.owner,
            receipt_id,
            transaction,
            group,
            cli.no_encrypt,
        ),
        Commands::Confirm { match_id, by } => {
            commands::cmd_confirm(&cli.db, &cli.owner, match_id, by.as_deref(), cli.no_encrypt)
        }
        Commands::Reject { match_id } => commands::cmd_reject(&cli.db, match_id, cli.no_encrypt),
        Commands::Approve { min_confidence } => {
            commands::cmd_approve(&cli.db, &cli.owner, min_confidence, cli.no_encrypt)
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
    }
}

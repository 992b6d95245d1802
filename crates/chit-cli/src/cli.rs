//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Chit - Match receipts to bank transactions
#[derive(Parser)]
#[command(name = "chit")]
#[command(about = "Receipt-to-transaction matching for expense reports", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "chit.db", global = true)]
    pub db: PathBuf,

    /// Owner scope for records and matching runs
    #[arg(long, default_value = "local", global = true)]
    pub owner: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CHIT_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status and recent auto-match runs
    Status,

    /// Register a receipt with already-extracted fields
    AddReceipt {
        /// Extracted total (omit if extraction failed)
        #[arg(long)]
        amount: Option<f64>,

        /// Extracted purchase date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Extracted vendor name
        #[arg(long)]
        vendor: Option<String>,
    },

    /// Register an imported bank/card transaction
    AddTransaction {
        /// Amount (negative = charge)
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,

        /// Statement date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Statement description
        #[arg(long)]
        description: String,
    },

    /// Collapse transactions into one matchable group
    Group {
        /// Member transaction ids (at least two)
        #[arg(required = true)]
        transaction_ids: Vec<i64>,
    },

    /// Run auto-match for the owner (or every owner with --all)
    Automatch {
        /// Sweep every owner instead of just --owner
        #[arg(long)]
        all: bool,
    },

    /// Show scored match candidates for a receipt
    Candidates {
        /// Receipt id
        receipt_id: i64,
    },

    /// Manually match a receipt to a transaction or a group
    Match {
        /// Receipt id
        receipt_id: i64,

        /// Target transaction id (exactly one of --transaction/--group)
        #[arg(long, conflicts_with = "group")]
        transaction: Option<i64>,

        /// Target group id (exactly one of --transaction/--group)
        #[arg(long)]
        group: Option<i64>,
    },

    /// Confirm a proposed match
    Confirm {
        /// Match id
        match_id: i64,

        /// Recorded as confirmed_by (defaults to the owner)
        #[arg(long)]
        by: Option<String>,
    },

    /// Reject a proposed or confirmed match
    Reject {
        /// Match id
        match_id: i64,
    },

    /// Confirm all proposals at or above a confidence floor
    Approve {
        /// Minimum confidence score
        #[arg(long, default_value = "80")]
        min_confidence: f64,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key from CHIT_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

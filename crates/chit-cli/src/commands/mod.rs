//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, status) and shared utilities (open_db)
//! - `data` - Record registration (receipts, transactions, groups)
//! - `matching` - Matching workflow (automatch, candidates, match, confirm, reject, approve)
//! - `serve` - Web server command

pub mod core;
pub mod data;
pub mod matching;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use data::*;
pub use matching::*;
pub use serve::*;

//! API route handlers

mod matches;
mod receipts;
mod transactions;

pub use matches::{
    batch_approve, confirm_match, create_manual_match, list_match_runs, list_matches,
    reject_match, trigger_auto_match,
};
pub use receipts::{create_receipt, get_candidates, get_receipt, list_receipts};
pub use transactions::{
    create_group, create_transaction, delete_group, get_group, get_transaction, list_groups,
    list_transactions,
};

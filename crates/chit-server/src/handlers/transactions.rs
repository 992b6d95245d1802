//! Transaction and transaction-group handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{get_owner, AppError, AppState, SuccessResponse};
use chit_core::models::{NewTransaction, Transaction, TransactionGroup};

/// Body for registering a transaction from the import pipeline
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: f64,
    pub transaction_date: NaiveDate,
    pub description: String,
}

/// POST /api/transactions - Register an imported transaction
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let owner = get_owner(&headers);

    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }

    let tx_id = state.db.create_transaction(&NewTransaction {
        owner: owner.clone(),
        amount: body.amount,
        transaction_date: body.transaction_date,
        description: body.description,
    })?;

    state
        .db
        .log_audit(&owner, "create", Some("transaction"), Some(tx_id), None)?;

    let tx = state
        .db
        .get_transaction(tx_id)?
        .ok_or_else(|| AppError::internal("Transaction not found after creation"))?;

    Ok(Json(tx))
}

/// Query params for listing transactions
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Filter by status (unmatched, proposed, matched)
    pub status: Option<String>,
}

/// GET /api/transactions - List transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let owner = get_owner(&headers);

    let status = match &query.status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| AppError::bad_request(&format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let txs = state.db.list_transactions(&owner, status)?;
    Ok(Json(txs))
}

/// GET /api/transactions/:id - Get a specific transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    let owner = get_owner(&headers);

    let tx = state
        .db
        .get_transaction(id)?
        .filter(|t| t.owner == owner)
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    Ok(Json(tx))
}

/// Body for collapsing transactions into a group
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub transaction_ids: Vec<i64>,
}

/// Group plus its members, for review display
#[derive(Debug, Serialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: TransactionGroup,
    pub members: Vec<Transaction>,
}

/// POST /api/transactions/groups - Create a group from member transactions
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    let owner = get_owner(&headers);

    let group_id = state.db.create_group(&owner, &body.transaction_ids)?;

    state.db.log_audit(
        &owner,
        "create",
        Some("transaction_group"),
        Some(group_id),
        Some(&format!("members={}", body.transaction_ids.len())),
    )?;

    let group = state
        .db
        .get_group(group_id)?
        .ok_or_else(|| AppError::internal("Group not found after creation"))?;
    let members = state.db.group_members(group_id)?;

    Ok(Json(GroupResponse { group, members }))
}

/// GET /api/transactions/groups - List groups
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<TransactionGroup>>, AppError> {
    let owner = get_owner(&headers);

    let status = match &query.status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| AppError::bad_request(&format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let groups = state.db.list_groups(&owner, status)?;
    Ok(Json(groups))
}

/// GET /api/transactions/groups/:id - Get a group with its members
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<GroupResponse>, AppError> {
    let owner = get_owner(&headers);

    let group = state
        .db
        .get_group(id)?
        .filter(|g| g.owner == owner)
        .ok_or_else(|| AppError::not_found("Group not found"))?;
    let members = state.db.group_members(id)?;

    Ok(Json(GroupResponse { group, members }))
}

/// DELETE /api/transactions/groups/:id - Disband an unmatched group
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let owner = get_owner(&headers);

    state
        .db
        .get_group(id)?
        .filter(|g| g.owner == owner)
        .ok_or_else(|| AppError::not_found("Group not found"))?;

    state.db.delete_group(id)?;

    state
        .db
        .log_audit(&owner, "delete", Some("transaction_group"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

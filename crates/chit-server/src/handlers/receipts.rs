//! Receipt handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{get_owner, AppError, AppState};
use chit_core::models::{NewReceipt, Receipt, ScoredCandidate};
use chit_core::CandidateFinder;

/// Body for registering a receipt (fields come pre-extracted from the
/// upstream upload/OCR pipeline)
#[derive(Debug, Deserialize)]
pub struct CreateReceiptRequest {
    pub amount: Option<f64>,
    pub receipt_date: Option<NaiveDate>,
    pub vendor: Option<String>,
}

/// POST /api/receipts - Register an extracted receipt
pub async fn create_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReceiptRequest>,
) -> Result<Json<Receipt>, AppError> {
    let owner = get_owner(&headers);

    let receipt_id = state.db.create_receipt(&NewReceipt {
        owner: owner.clone(),
        amount: body.amount,
        receipt_date: body.receipt_date,
        vendor: body.vendor,
    })?;

    state.db.log_audit(
        &owner,
        "create",
        Some("receipt"),
        Some(receipt_id),
        None,
    )?;

    let receipt = state
        .db
        .get_receipt(receipt_id)?
        .ok_or_else(|| AppError::internal("Receipt not found after creation"))?;

    Ok(Json(receipt))
}

/// Query params for listing receipts
#[derive(Debug, Deserialize)]
pub struct ListReceiptsQuery {
    /// Filter by status (unmatched, proposed, matched)
    pub status: Option<String>,
}

/// GET /api/receipts - List receipts, optionally filtered by status
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListReceiptsQuery>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let owner = get_owner(&headers);

    let status = match &query.status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| AppError::bad_request(&format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let receipts = state.db.list_receipts(&owner, status)?;
    Ok(Json(receipts))
}

/// GET /api/receipts/:id - Get a specific receipt
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Receipt>, AppError> {
    let owner = get_owner(&headers);

    let receipt = state
        .db
        .get_receipt(id)?
        .filter(|r| r.owner == owner)
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    Ok(Json(receipt))
}

/// GET /api/receipts/:id/candidates - Scored candidates for a receipt
///
/// Ordered by confidence for the review UI. Grouped transactions never
/// appear individually; an unscorable receipt gets an empty list, not an
/// error.
pub async fn get_candidates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ScoredCandidate>>, AppError> {
    let owner = get_owner(&headers);

    let receipt = state
        .db
        .get_receipt(id)?
        .filter(|r| r.owner == owner)
        .ok_or_else(|| AppError::not_found("Receipt not found"))?;

    let finder = CandidateFinder::new(&state.db, &state.matching);
    let candidates = finder.scored_for_receipt(&receipt)?;

    Ok(Json(candidates))
}

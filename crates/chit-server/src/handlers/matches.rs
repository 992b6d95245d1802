//! Match lifecycle and auto-match handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{get_owner, AppError, AppState};
use chit_core::models::{AutoMatchSummary, BatchApproveSummary, Match, MatchRun, MatchTarget};
use chit_core::{AutoMatchOrchestrator, CancelFlag, MatchLifecycle};

/// Query params for the review queue
#[derive(Debug, Deserialize)]
pub struct ListMatchesQuery {
    /// Filter by state (proposed, confirmed, rejected)
    pub state: Option<String>,
}

/// GET /api/matches - Review queue ordered by confidence
pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let owner = get_owner(&headers);

    let match_state = match &query.state {
        Some(s) => Some(
            s.parse()
                .map_err(|_| AppError::bad_request(&format!("Unknown state: {}", s)))?,
        ),
        None => None,
    };

    let matches = state.db.list_matches(&owner, match_state)?;
    Ok(Json(matches))
}

/// POST /api/matches/auto - Run auto-match for the calling owner
pub async fn trigger_auto_match(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AutoMatchSummary>, AppError> {
    let owner = get_owner(&headers);

    let orchestrator = AutoMatchOrchestrator::new(&state.db, &state.matching, &state.locks);
    let summary = orchestrator.run_for_owner(&owner, &CancelFlag::new())?;

    state.db.log_audit(
        &owner,
        "auto_match",
        Some("match_run"),
        None,
        Some(&format!(
            "processed={}, proposed={}",
            summary.processed, summary.proposed
        )),
    )?;

    Ok(Json(summary))
}

/// Body for a manual match request. The either/or pair is validated here
/// and collapsed into the target enum before it reaches the lifecycle.
#[derive(Debug, Deserialize)]
pub struct ManualMatchRequest {
    pub receipt_id: i64,
    pub transaction_id: Option<i64>,
    pub transaction_group_id: Option<i64>,
}

/// POST /api/matches/manual - Create a manual match (starts Proposed)
pub async fn create_manual_match(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ManualMatchRequest>,
) -> Result<Json<Match>, AppError> {
    let owner = get_owner(&headers);

    let target = MatchTarget::from_columns(body.transaction_id, body.transaction_group_id)
        .map_err(|e| AppError::bad_request(&e))?;

    let lifecycle = MatchLifecycle::new(&state.db, &state.locks);
    let m = lifecycle.create_manual_match(&owner, body.receipt_id, target)?;

    state.db.log_audit(
        &owner,
        "manual_match",
        Some("match"),
        Some(m.id),
        Some(&format!("receipt={}, target={}", body.receipt_id, target)),
    )?;

    Ok(Json(m))
}

/// Optional body for confirm
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    /// Recorded as confirmed_by; defaults to the owner scope
    pub confirmed_by: Option<String>,
}

/// POST /api/matches/:id/confirm - Confirm a proposed match
pub async fn confirm_match(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<Match>, AppError> {
    let owner = get_owner(&headers);
    let confirmed_by = body
        .and_then(|Json(b)| b.confirmed_by)
        .unwrap_or_else(|| owner.clone());

    // Matches are owner-scoped; a foreign id reads as absent
    state
        .db
        .get_match(id)?
        .filter(|m| m.owner == owner)
        .ok_or_else(|| AppError::not_found("Match not found"))?;

    let lifecycle = MatchLifecycle::new(&state.db, &state.locks);
    let m = lifecycle.confirm_match(id, &confirmed_by)?;

    state
        .db
        .log_audit(&owner, "confirm", Some("match"), Some(id), None)?;

    Ok(Json(m))
}

/// POST /api/matches/:id/reject - Reject a proposed or confirmed match
pub async fn reject_match(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Match>, AppError> {
    let owner = get_owner(&headers);

    state
        .db
        .get_match(id)?
        .filter(|m| m.owner == owner)
        .ok_or_else(|| AppError::not_found("Match not found"))?;

    let lifecycle = MatchLifecycle::new(&state.db, &state.locks);
    let m = lifecycle.reject_match(id)?;

    state
        .db
        .log_audit(&owner, "reject", Some("match"), Some(id), None)?;

    Ok(Json(m))
}

/// Body for batch approval
#[derive(Debug, Deserialize)]
pub struct BatchApproveRequest {
    pub min_confidence: f64,
}

/// POST /api/matches/approve - Confirm all proposals at or above a floor
pub async fn batch_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BatchApproveRequest>,
) -> Result<Json<BatchApproveSummary>, AppError> {
    let owner = get_owner(&headers);

    let lifecycle = MatchLifecycle::new(&state.db, &state.locks);
    let summary = lifecycle.batch_approve(
        &owner,
        body.min_confidence,
        &owner,
        &CancelFlag::new(),
    )?;

    state.db.log_audit(
        &owner,
        "batch_approve",
        Some("match"),
        None,
        Some(&format!(
            "min_confidence={}, approved={}, skipped={}",
            body.min_confidence, summary.approved, summary.skipped
        )),
    )?;

    Ok(Json(summary))
}

/// Query params for run history
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

/// GET /api/matches/runs - Auto-match run history
pub async fn list_match_runs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<MatchRun>>, AppError> {
    let owner = get_owner(&headers);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let runs = state.db.list_match_runs(&owner, limit)?;
    Ok(Json(runs))
}

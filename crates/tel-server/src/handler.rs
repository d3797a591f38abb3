use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tel_ledger::{AnchorReceipt, AuditLedger, ExportBundle, QueryFilter, VerificationReport};
use tel_store::AnchorSink;
use tel_types::{Digest, EventDraft, EventId, EventType, LedgerEntry, Severity, Timestamp};

use crate::error::{ServerError, ServerResult};

/// Upper bound on entries returned by one search request.
pub const MAX_SEARCH_LIMIT: usize = 1000;
const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: AuditLedger,
    pub anchor: Arc<dyn AnchorSink>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendResponse {
    pub event_id: EventId,
    pub sequence_number: u64,
    pub current_digest: Digest,
    pub merkle_root: Digest,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub actor: Option<String>,
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub min_severity: Option<Severity>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub time_from: Option<u64>,
    pub time_to: Option<u64>,
    pub limit: Option<usize>,
}

impl SearchParams {
    fn into_filter(self) -> (QueryFilter, usize) {
        let filter = QueryFilter {
            actor_id: self.actor,
            event_type: self.event_type,
            severity: self.severity,
            min_severity: self.min_severity,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            time_from: self.time_from.map(Timestamp),
            time_to: self.time_to.map(Timestamp),
        };
        let limit = self
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .min(MAX_SEARCH_LIMIT);
        (filter, limit)
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let head = state.ledger.head();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "entries": head.len,
        "merkle_root": head.merkle_root,
    }))
}

pub async fn append_handler(
    State(state): State<AppState>,
    Json(draft): Json<EventDraft>,
) -> ServerResult<(StatusCode, Json<AppendResponse>)> {
    let entry = state.ledger.append(draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(AppendResponse {
            event_id: entry.event.event_id,
            sequence_number: entry.sequence_number,
            current_digest: entry.current_digest(),
            merkle_root: entry.merkle_root,
        }),
    ))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ServerResult<Json<Vec<LedgerEntry>>> {
    let (filter, limit) = params.into_filter();
    let ledger = state.ledger.clone();
    let entries = tokio::task::spawn_blocking(move || ledger.search(filter, Some(limit)))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    Ok(Json(entries))
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Query(range): Query<RangeParams>,
) -> ServerResult<Json<VerificationReport>> {
    Ok(Json(state.ledger.verify(range.start, range.end).await?))
}

pub async fn export_handler(
    State(state): State<AppState>,
    Query(range): Query<RangeParams>,
) -> ServerResult<Json<ExportBundle>> {
    Ok(Json(state.ledger.export(range.start, range.end).await?))
}

pub async fn anchor_handler(
    State(state): State<AppState>,
    Query(range): Query<RangeParams>,
) -> ServerResult<Json<AnchorReceipt>> {
    let bundle = state.ledger.export(range.start, range.end).await?;
    let receipt = state.ledger.anchor(&bundle, state.anchor.as_ref()).await?;
    Ok(Json(receipt))
}

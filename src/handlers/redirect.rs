use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct IndexQuery {
    code: Option<String>,
}

/// GET /:code
///
/// Served entirely from the in-memory cache; an expired code is evicted on
/// the way and reported as not found.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    match state.service.resolve(&code) {
        Ok(target) => found(target),
        Err(e) => e.into_response(),
    }
}

/// GET /
///
/// `?code=X` forwards to `/X`; without it, lists every live link.
pub async fn index(State(state): State<Arc<AppState>>, Query(query): Query<IndexQuery>) -> Response {
    match query.code {
        Some(code) => found(format!("/{code}")),
        None => Json(state.service.snapshot()).into_response(),
    }
}

/// 302 to `location`.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

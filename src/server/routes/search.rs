//! Search endpoint

use axum::{extract::State, Json};
use std::time::Instant;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{SearchRequest, SearchResponse};

/// POST /api/search - Query the knowledge base
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    tracing::debug!(
        "Search: {:?} (mode: {}, max: {})",
        request.query,
        request.mode.as_str(),
        request.max_results
    );

    let outcome = state
        .ranker()
        .search(&request.query, request.mode, request.max_results)
        .await?;

    Ok(Json(SearchResponse {
        success: true,
        total_results: outcome.results.len(),
        results: outcome.results,
        degraded: outcome.degraded,
        from_cache: outcome.from_cache,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

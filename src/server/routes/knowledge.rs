//! Direct knowledge management and stats endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{AddKnowledgeRequest, CacheStatsResponse, KnowledgeChunk, KnowledgeStatsResponse};

#[derive(Debug, Serialize)]
pub struct AddKnowledgeResponse {
    pub success: bool,
    pub id: Uuid,
}

/// POST /api/knowledge - Add a knowledge entry without file upload
pub async fn add_knowledge(
    State(state): State<AppState>,
    Json(request): Json<AddKnowledgeRequest>,
) -> Result<Json<AddKnowledgeResponse>> {
    let chunk = KnowledgeChunk::new(request.title, request.content, request.category.clone())
        .with_tags(request.tags)
        .with_metadata(request.metadata);
    let chunk_hash = chunk.content_hash.clone();
    let content = chunk.content.clone();

    let id = state.store().insert(chunk)?;

    // Skip the embedding call on a dedup hit
    let is_new = state
        .store()
        .get(id)
        .map(|c| c.content_hash == chunk_hash && c.embedding.is_none())
        .unwrap_or(false);
    if is_new {
        match state.embedder().embed(&content).await {
            Ok(v) => state.store().update_embedding(id, v)?,
            Err(e) => tracing::warn!("Embedding unavailable for knowledge entry: {}", e),
        }
    }

    state.cache().invalidate_category(&request.category);

    Ok(Json(AddKnowledgeResponse { success: true, id }))
}

/// GET /api/knowledge/stats
pub async fn knowledge_stats(
    State(state): State<AppState>,
) -> Result<Json<KnowledgeStatsResponse>> {
    Ok(Json(state.store().stats()))
}

/// GET /api/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Result<Json<CacheStatsResponse>> {
    Ok(Json(state.cache().stats()))
}

//! Response types for the HTTP surface

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A chunk scored against a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Strategy-normalized score; comparable only within a single response
    pub similarity_score: f32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a retrieval call at the library boundary
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: Vec<ScoredChunk>,
    /// True when hybrid or simple mode fell back to text-only
    pub degraded: bool,
    /// True when served from the query cache
    pub from_cache: bool,
}

/// Search response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<ScoredChunk>,
    pub total_results: usize,
    pub degraded: bool,
    pub from_cache: bool,
    pub processing_time_ms: u64,
}

/// Per-file result in an ingest batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileResult {
    pub filename: String,
    pub success: bool,
    /// Batch-scoped document id, also stamped into each chunk's metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    pub chunks_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

/// Ingest batch response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub files: Vec<IngestFileResult>,
    pub total_chunks_created: usize,
}

/// Query cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub max_entries: usize,
    pub ttl_seconds: i64,
}

/// Knowledge store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStatsResponse {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub categories: HashMap<String, usize>,
}

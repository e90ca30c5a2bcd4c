//! API routes for the lending RAG server

pub mod ingest;
pub mod knowledge;
pub mod search;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Ingestion - with larger body limit for file uploads
        .route(
            "/ingest",
            post(ingest::ingest_files).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Search
        .route("/search", post(search::search))
        // Direct knowledge management
        .route("/knowledge", post(knowledge::add_knowledge))
        .route("/knowledge/stats", get(knowledge::knowledge_stats))
        // Cache introspection
        .route("/cache/stats", get(knowledge::cache_stats))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(state: axum::extract::State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "lending-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Lending products Q&A with multi-format ingestion and bank auto-learning",
        "known_banks": state.registry().len(),
        "endpoints": {
            "POST /api/ingest": "Upload and process documents",
            "POST /api/search": "Search the knowledge base",
            "POST /api/knowledge": "Add a knowledge entry directly",
            "GET /api/knowledge/stats": "Knowledge base statistics",
            "GET /api/cache/stats": "Query cache statistics"
        },
        "features": {
            "formats": "txt, md, csv, html, pdf, docx, pptx, xlsx, images (OCR)",
            "hybrid_search": "Vector + lexical retrieval with graceful degradation",
            "deduplication": "Content-hash deduplication per category",
            "auto_learning": "Unknown banks are looked up, summarized and ingested",
            "query_caching": "TTL cache with category and alias invalidation"
        }
    }))
}

//! Document ingestion endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{IngestFileResult, IngestOptions, IngestResponse, KnowledgeChunk};

const PREVIEW_CHARS: usize = 200;

/// POST /api/ingest - Upload and process files
///
/// Each file is extracted, chunked and stored independently. A failure on
/// one file is reported in its result entry and the batch continues.
pub async fn ingest_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>> {
    let mut files = Vec::new();
    let mut total_chunks = 0usize;
    let mut options = IngestOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Internal(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        // The "options" field applies to every file in the batch
        if name == "options" {
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::Internal(format!("Failed to read options: {}", e)))?;
            if let Ok(opts) = serde_json::from_slice::<IngestOptions>(&data) {
                options = opts;
            }
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("file_{}.bin", Uuid::new_v4()));

        let file_start = Instant::now();

        let data = match field.bytes().await {
            Ok(d) => d,
            Err(e) => {
                files.push(failure(
                    filename,
                    format!("Failed to read file: {}", e),
                    file_start,
                ));
                continue;
            }
        };

        tracing::info!("Processing file: {} ({} bytes)", filename, data.len());

        match process_file(&state, &filename, &data, &options).await {
            Ok(mut result) => {
                total_chunks += result.chunks_created;
                result.processing_time_ms = file_start.elapsed().as_millis() as u64;
                tracing::info!(
                    "Ingested {}: {} chunks in {}ms",
                    result.filename,
                    result.chunks_created,
                    result.processing_time_ms
                );
                files.push(result);
            }
            Err(e) => {
                tracing::warn!("Failed to process {}: {}", filename, e);
                files.push(failure(filename, e.to_string(), file_start));
            }
        }
    }

    let success = files.iter().any(|f| f.success);
    Ok(Json(IngestResponse {
        success,
        files,
        total_chunks_created: total_chunks,
    }))
}

/// Extract, chunk, embed and store one uploaded file
async fn process_file(
    state: &AppState,
    filename: &str,
    data: &[u8],
    options: &IngestOptions,
) -> Result<IngestFileResult> {
    let doc = state.extractor().extract(filename, data).await?;
    let document_id = Uuid::new_v4();
    let preview: String = doc.content.chars().take(PREVIEW_CHARS).collect();

    let texts = state.chunker().chunk(&doc.content);

    // Embeddings are best-effort: chunks land without vectors when the
    // backend is down and remain findable through lexical search.
    let embeddings = match state.embedder().embed_batch(&texts).await {
        Ok(vecs) => Some(vecs),
        Err(e) => {
            tracing::warn!("Embedding unavailable during ingest of {}: {}", filename, e);
            None
        }
    };

    let mut chunks_created = 0usize;
    for (i, text) in texts.iter().enumerate() {
        let title = if texts.len() > 1 {
            format!("{} (part {})", filename, i + 1)
        } else {
            filename.to_string()
        };

        let mut metadata = options.metadata.clone();
        metadata.insert(
            "source_file".to_string(),
            serde_json::Value::String(filename.to_string()),
        );
        metadata.insert(
            "document_id".to_string(),
            serde_json::Value::String(document_id.to_string()),
        );
        metadata.insert(
            "doc_class".to_string(),
            serde_json::Value::String(doc.doc_class.as_str().to_string()),
        );

        let chunk =
            KnowledgeChunk::new(title, text.clone(), options.category.clone()).with_metadata(metadata);
        let chunk_hash = chunk.content_hash.clone();
        let id = state.store().insert(chunk)?;

        // Dedup hits reuse the existing id; only refresh the embedding when
        // this call actually owns a vector for the content.
        if let Some(ref vecs) = embeddings {
            if let Some(existing) = state.store().get(id) {
                if existing.content_hash == chunk_hash {
                    if let Some(v) = vecs.get(i) {
                        state.store().update_embedding(id, v.clone())?;
                    }
                }
            }
        }
        chunks_created += 1;
    }

    state.cache().invalidate_category(&options.category);

    Ok(IngestFileResult {
        filename: filename.to_string(),
        success: true,
        document_id: Some(document_id),
        document_type: Some(doc.document_type.display_name().to_string()),
        chunks_created,
        content_preview: Some(preview),
        error: None,
        processing_time_ms: doc.extraction_ms,
    })
}

fn failure(filename: String, error: String, started: Instant) -> IngestFileResult {
    IngestFileResult {
        filename,
        success: false,
        document_id: None,
        document_type: None,
        chunks_created: 0,
        content_preview: None,
        error: Some(error),
        processing_time_ms: started.elapsed().as_millis() as u64,
    }
}

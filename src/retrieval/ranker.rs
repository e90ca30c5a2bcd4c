//! Hybrid retrieval with caching, degradation, and the auto-learn hook

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::QueryCache;
use crate::error::{Error, Result};
use crate::learning::{AutoLearner, Detection, EntityDetector, LearnOutcome};
use crate::providers::EmbeddingProvider;
use crate::store::KnowledgeStore;
use crate::types::{KnowledgeChunk, ScoredChunk, SearchMode, SearchOutcome};

/// Hybrid retrieval ranker
///
/// The single dispatch point for all retrieval strategies. `search` is the
/// library boundary: cache probe, entity detection (with the auto-learn hook
/// for unknown entities), strategy dispatch, merge, and cache fill.
pub struct HybridRanker {
    store: Arc<KnowledgeStore>,
    cache: Arc<QueryCache>,
    embedder: Arc<dyn EmbeddingProvider>,
    detector: Arc<EntityDetector>,
    learner: Arc<AutoLearner>,
    embed_timeout: Duration,
}

impl HybridRanker {
    pub fn new(
        store: Arc<KnowledgeStore>,
        cache: Arc<QueryCache>,
        embedder: Arc<dyn EmbeddingProvider>,
        detector: Arc<EntityDetector>,
        learner: Arc<AutoLearner>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            embedder,
            detector,
            learner,
            embed_timeout,
        }
    }

    /// Run a search
    ///
    /// Every embedding-backed mode degrades to text-only retrieval when the
    /// embedding backend is down; the outage surfaces as the `degraded` flag
    /// on the outcome, never as a request failure. An empty store or zero
    /// matches is an empty result, not an error.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        max_results: usize,
    ) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return Ok(SearchOutcome::default());
        }

        if let Some((results, degraded)) = self.cache.get(query, mode, max_results) {
            return Ok(SearchOutcome {
                results,
                degraded,
                from_cache: true,
            });
        }

        // Unknown entities trigger a learn before retrieval so the fresh
        // knowledge is visible to this very query
        if let Detection::Unknown(entity) = self.detector.detect(query, &self.store) {
            match self.learner.learn(&entity).await {
                LearnOutcome::Ingested(_) | LearnOutcome::AlreadyLearned => {}
                LearnOutcome::Failed(reason) => {
                    tracing::warn!(entity, "auto-learn failed: {}", reason);
                }
            }
        }

        let (results, degraded) = match mode {
            SearchMode::Vector => match self.query_embedding(query).await {
                Ok(embedding) => (self.vector_results(&embedding, max_results), false),
                Err(e) => {
                    tracing::debug!("vector search degrading to text-only: {}", e);
                    (self.text_results(query, max_results), true)
                }
            },
            SearchMode::Text => (self.text_results(query, max_results), false),
            SearchMode::Simple => match self.query_embedding(query).await {
                Ok(embedding) => (self.vector_results(&embedding, max_results), false),
                Err(e) => {
                    tracing::debug!("simple search falling back to text: {}", e);
                    (self.text_results(query, max_results), true)
                }
            },
            SearchMode::Hybrid => match self.query_embedding(query).await {
                Ok(embedding) => {
                    let vector = self.store.vector_search(&embedding, max_results);
                    let text = self.store.text_search(query, max_results);
                    (merge_hybrid(vector, text, max_results), false)
                }
                Err(e) => {
                    tracing::debug!("hybrid search degrading to text-only: {}", e);
                    (self.text_results(query, max_results), true)
                }
            },
        };

        self.cache
            .put(query, mode, max_results, results.clone(), degraded);

        Ok(SearchOutcome {
            results,
            degraded,
            from_cache: false,
        })
    }

    /// Embed the query under a timeout; expiry means the capability is
    /// unavailable, not that the request failed
    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed(query)).await {
            Ok(result) => result,
            Err(_) => Err(Error::embedding(format!(
                "query embedding timed out after {:?}",
                self.embed_timeout
            ))),
        }
    }

    fn vector_results(&self, embedding: &[f32], max_results: usize) -> Vec<ScoredChunk> {
        self.store
            .vector_search(embedding, max_results)
            .into_iter()
            .map(|(chunk, score)| to_scored(chunk, score))
            .collect()
    }

    fn text_results(&self, query: &str, max_results: usize) -> Vec<ScoredChunk> {
        let scored = self.store.text_search(query, max_results);
        normalize_top(scored)
            .into_iter()
            .map(|(chunk, score)| to_scored(chunk, score))
            .collect()
    }
}

/// Merge vector and text result lists
///
/// Each strategy's scores are normalized so its top result scores 1.0; a
/// chunk found by both keeps the larger normalized score. Ties order by
/// `updated_at` descending.
fn merge_hybrid(
    vector: Vec<(KnowledgeChunk, f32)>,
    text: Vec<(KnowledgeChunk, f32)>,
    max_results: usize,
) -> Vec<ScoredChunk> {
    let vector = normalize_top(vector);
    let text = normalize_top(text);

    let mut merged: HashMap<Uuid, (KnowledgeChunk, f32)> = HashMap::new();
    for (chunk, score) in vector.into_iter().chain(text) {
        match merged.get_mut(&chunk.id) {
            Some((_, existing)) => {
                if score > *existing {
                    *existing = score;
                }
            }
            None => {
                merged.insert(chunk.id, (chunk, score));
            }
        }
    }

    let mut results: Vec<(KnowledgeChunk, f32)> = merged.into_values().collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
    });
    results.truncate(max_results);
    results
        .into_iter()
        .map(|(chunk, score)| to_scored(chunk, score))
        .collect()
}

/// Scale a result list so its top score is 1.0
fn normalize_top(mut scored: Vec<(KnowledgeChunk, f32)>) -> Vec<(KnowledgeChunk, f32)> {
    let top = scored
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    if top > 0.0 {
        for (_, score) in scored.iter_mut() {
            *score /= top;
        }
    }
    scored
}

fn to_scored(chunk: KnowledgeChunk, score: f32) -> ScoredChunk {
    ScoredChunk {
        id: chunk.id,
        title: chunk.title,
        content: chunk.content,
        category: chunk.category,
        tags: chunk.tags,
        similarity_score: score,
        updated_at: chunk.updated_at,
    }
}

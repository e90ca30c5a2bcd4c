//! Auto-learning ingestion for unknown entities
//!
//! A learn run moves through Detected, Searching, Summarizing, and ends in
//! Ingested or Failed. There is no retry inside a request; a failed entity
//! can be attempted again by a later query. Concurrent learns for the same
//! canonical name collapse into one run.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::cache::QueryCache;
use crate::ingestion::TextChunker;
use crate::providers::{EmbeddingProvider, LlmProvider, LookupProvider};
use crate::store::KnowledgeStore;
use crate::types::KnowledgeChunk;

use super::registry::EntityRegistry;

/// Outcome of a learn run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    /// A knowledge chunk was written
    Ingested(Uuid),
    /// This entity was already learned in this process
    AlreadyLearned,
    /// Lookup or summarization failed; nothing was written
    Failed(String),
}

/// Auto-learning ingestor
pub struct AutoLearner {
    store: Arc<KnowledgeStore>,
    registry: Arc<EntityRegistry>,
    cache: Arc<QueryCache>,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    lookup: Arc<dyn LookupProvider>,
    llm: Arc<dyn LlmProvider>,
    /// Entities learned during this process lifetime
    learned: DashMap<String, Uuid>,
    /// In-flight guard collapsing concurrent learns per canonical name
    inflight: DashMap<String, Arc<Notify>>,
}

impl AutoLearner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<KnowledgeStore>,
        registry: Arc<EntityRegistry>,
        cache: Arc<QueryCache>,
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        lookup: Arc<dyn LookupProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            cache,
            chunker,
            embedder,
            lookup,
            llm,
            learned: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Learn an unknown entity; at most one chunk is ever written per entity
    pub async fn learn(&self, entity: &str) -> LearnOutcome {
        if self.learned.contains_key(entity) {
            return LearnOutcome::AlreadyLearned;
        }

        // Single-flight: either become the leader or wait for the current run
        let notify = match self.inflight.entry(entity.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let notify = Arc::new(Notify::new());
                vacant.insert(notify.clone());
                notify
            }
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                let notify = occupied.get().clone();
                drop(occupied);
                // Register with the Notify before re-checking inflight, so a
                // notify_waiters between the check and the await is not lost
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inflight.contains_key(entity) {
                    notified.await;
                }
                if self.learned.contains_key(entity) {
                    return LearnOutcome::AlreadyLearned;
                }
                // Leader failed; this task does not retry
                return LearnOutcome::Failed(format!(
                    "concurrent learn for '{}' did not produce knowledge",
                    entity
                ));
            }
        };

        let outcome = self.run(entity).await;

        if let LearnOutcome::Ingested(id) = &outcome {
            self.learned.insert(entity.to_string(), *id);
        }
        self.inflight.remove(entity);
        notify.notify_waiters();

        outcome
    }

    /// How many entities were learned this process lifetime
    pub fn learned_count(&self) -> usize {
        self.learned.len()
    }

    async fn run(&self, entity: &str) -> LearnOutcome {
        tracing::info!(entity, "learning detected entity");

        tracing::debug!(entity, "phase: searching");
        let raw_text = match self.lookup.lookup(entity).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(entity, "lookup failed: {}", e);
                return LearnOutcome::Failed(format!("could not retrieve facts: {}", e));
            }
        };

        tracing::debug!(entity, "phase: summarizing");
        let summary = match self.llm.summarize_entity(entity, &raw_text).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(entity, "summarization failed: {}", e);
                return LearnOutcome::Failed(format!("could not summarize facts: {}", e));
            }
        };

        // The summary goes through the normal chunking path; only the first
        // chunk is kept so a learned entity is exactly one chunk
        let body = self
            .chunker
            .chunk(&summary.body)
            .into_iter()
            .next()
            .unwrap_or_else(|| summary.body.clone());
        if body.trim().is_empty() {
            return LearnOutcome::Failed(format!("summary for '{}' was empty", entity));
        }

        let mut tags = summary.tags.clone();
        if !tags.contains(&entity.to_string()) {
            tags.push(entity.to_string());
        }

        let category = if summary.category.trim().is_empty() {
            "bank_info".to_string()
        } else {
            summary.category.clone()
        };

        let mut chunk = KnowledgeChunk::new(summary.title.clone(), body, category.clone())
            .with_tags(tags.clone());

        // Embedding is best effort; an unreachable backend leaves the chunk
        // text-searchable
        match self.embedder.embed(&chunk.content).await {
            Ok(embedding) => chunk.embedding = Some(embedding),
            Err(e) => {
                tracing::warn!(entity, "embedding unavailable during learn: {}", e);
            }
        }

        let id = match self.store.insert(chunk) {
            Ok(id) => id,
            Err(e) => return LearnOutcome::Failed(format!("store rejected chunk: {}", e)),
        };

        // Register aliases and drop cache entries that went stale
        self.registry.add_entity(entity, tags);
        let names = self.registry.all_names(entity);
        self.cache.invalidate_matching(&names);
        self.cache.invalidate_category(&category);

        tracing::info!(entity, chunk_id = %id, "entity learned");
        LearnOutcome::Ingested(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::providers::EntitySummary;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
        fn dimensions(&self) -> usize {
            4
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct CountingLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LookupProvider for CountingLookup {
        async fn lookup(&self, entity: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::lookup("unreachable"))
            } else {
                Ok(format!("{}是一家外资商业银行，在中国提供贷款服务。", entity))
            }
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn summarize_entity(&self, entity: &str, raw_text: &str) -> Result<EntitySummary> {
            Ok(EntitySummary {
                title: entity.to_string(),
                body: raw_text.to_string(),
                category: "bank_info".to_string(),
                tags: vec![entity.to_string()],
            })
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
        fn name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo"
        }
    }

    fn learner(fail_lookup: bool) -> (Arc<AutoLearner>, Arc<KnowledgeStore>, Arc<CountingLookup>) {
        let store = Arc::new(KnowledgeStore::ephemeral(4));
        let lookup = Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            fail: fail_lookup,
        });
        let learner = Arc::new(AutoLearner::new(
            store.clone(),
            Arc::new(EntityRegistry::seeded()),
            Arc::new(QueryCache::default()),
            TextChunker::default(),
            Arc::new(FixedEmbedder),
            lookup.clone(),
            Arc::new(EchoLlm),
        ));
        (learner, store, lookup)
    }

    #[tokio::test]
    async fn learn_writes_exactly_one_chunk() {
        let (learner, store, _) = learner(false);
        let outcome = learner.learn("星展银行").await;
        assert!(matches!(outcome, LearnOutcome::Ingested(_)));
        assert_eq!(store.len(), 1);
        assert!(store.contains_entity("星展银行"));
    }

    #[tokio::test]
    async fn second_learn_is_a_noop() {
        let (learner, store, lookup) = learner(false);
        learner.learn("星展银行").await;
        let outcome = learner.learn("星展银行").await;
        assert_eq!(outcome, LearnOutcome::AlreadyLearned);
        assert_eq!(store.len(), 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lookup_writes_nothing() {
        let (learner, store, _) = learner(true);
        let outcome = learner.learn("星展银行").await;
        assert!(matches!(outcome, LearnOutcome::Failed(_)));
        assert_eq!(store.len(), 0);
        assert_eq!(learner.learned_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_learns_collapse() {
        let (learner, store, lookup) = learner(false);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let learner = learner.clone();
                tokio::spawn(async move { learner.learn("星展银行").await })
            })
            .collect();

        let mut ingested = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), LearnOutcome::Ingested(_)) {
                ingested += 1;
            }
        }

        assert_eq!(ingested, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }
}

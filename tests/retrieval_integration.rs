//! End-to-end retrieval tests over mock providers
//!
//! Drives `HybridRanker` with deterministic embedding, lookup, and LLM
//! mocks so caching, degradation, and auto-learning are exercised without
//! any external services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lending_rag::cache::QueryCache;
use lending_rag::error::{Error, Result};
use lending_rag::learning::{AutoLearner, EntityDetector, EntityRegistry};
use lending_rag::providers::{EmbeddingProvider, EntitySummary, LlmProvider, LookupProvider};
use lending_rag::retrieval::HybridRanker;
use lending_rag::store::KnowledgeStore;
use lending_rag::types::{KnowledgeChunk, SearchMode};

const DIMS: usize = 4;

/// Embedder returning the same unit vector for every text, or failing
struct FixedEmbedder {
    fail: bool,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(Error::embedding("backend down"));
        }
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Lookup counting how many times it was called
struct CountingLookup {
    calls: AtomicUsize,
}

impl CountingLookup {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupProvider for CountingLookup {
    async fn lookup(&self, entity: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}是一家提供个人和企业贷款服务的商业银行。", entity))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// LLM echoing the raw text back as a summary
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

struct Harness {
    store: Arc<KnowledgeStore>,
    cache: Arc<QueryCache>,
    lookup: Arc<CountingLookup>,
    ranker: HybridRanker,
    // Keeps the backing store file alive for the test's duration
    _dir: tempfile::TempDir,
}

fn harness(embedder_fails: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(KnowledgeStore::new(dir.path().join("store.json"), DIMS));
    let cache = Arc::new(QueryCache::new(100, 3600));
    let registry = Arc::new(EntityRegistry::seeded());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FixedEmbedder {
        fail: embedder_fails,
    });
    let lookup = Arc::new(CountingLookup::new());
    let llm: Arc<dyn LlmProvider> = Arc::new(EchoLlm);

    let learner = Arc::new(AutoLearner::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&cache),
        lending_rag::ingestion::TextChunker::new(300, 50),
        Arc::clone(&embedder),
        lookup.clone(),
        Arc::clone(&llm),
    ));
    let detector = Arc::new(EntityDetector::new(Arc::clone(&registry)));

    let ranker = HybridRanker::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        embedder,
        detector,
        learner,
        Duration::from_secs(5),
    );

    Harness {
        store,
        cache,
        lookup,
        ranker,
        _dir: dir,
    }
}

fn seeded_chunk(title: &str, content: &str, with_embedding: bool) -> KnowledgeChunk {
    let mut chunk = KnowledgeChunk::new(title, content, "loan_products");
    if with_embedding {
        chunk.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
    }
    chunk
}

#[tokio::test]
async fn empty_store_returns_empty_results() {
    let h = harness(false);
    let outcome = h
        .ranker
        .search("提前还款有没有违约金", SearchMode::Hybrid, 5)
        .await
        .unwrap();
    assert!(outcome.results.is_empty());
    assert!(!outcome.degraded);
    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn results_respect_max_results() {
    let h = harness(false);
    for i in 0..10 {
        h.store
            .insert(seeded_chunk(
                &format!("product {}", i),
                &format!("贷款产品{}的申请条件和提前还款说明", i),
                true,
            ))
            .unwrap();
    }

    let outcome = h
        .ranker
        .search("提前还款", SearchMode::Hybrid, 3)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 3);
}

#[tokio::test]
async fn second_search_is_served_from_cache() {
    let h = harness(false);
    h.store
        .insert(seeded_chunk("还款", "提前还款不收取违约金。", true))
        .unwrap();

    let first = h
        .ranker
        .search("提前还款", SearchMode::Hybrid, 5)
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.results.len(), 1);

    let second = h
        .ranker
        .search("提前还款", SearchMode::Hybrid, 5)
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.results, first.results);
}

#[tokio::test]
async fn hybrid_degrades_to_text_when_embedder_is_down() {
    let h = harness(true);
    h.store
        .insert(seeded_chunk("还款", "提前还款不收取违约金。", false))
        .unwrap();

    let outcome = h
        .ranker
        .search("提前还款", SearchMode::Hybrid, 5)
        .await
        .unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.results.len(), 1);
    assert!((outcome.results[0].similarity_score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn vector_mode_degrades_to_text_when_embedder_is_down() {
    let h = harness(true);
    h.store
        .insert(seeded_chunk("还款", "提前还款不收取违约金。", false))
        .unwrap();

    let outcome = h
        .ranker
        .search("提前还款", SearchMode::Vector, 5)
        .await
        .unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].title, "还款");
}

#[tokio::test]
async fn unknown_bank_is_learned_and_retrieved() {
    let h = harness(false);

    let outcome = h
        .ranker
        .search("恒丰银行的贷款利率是多少", SearchMode::Hybrid, 5)
        .await
        .unwrap();

    assert_eq!(h.lookup.call_count(), 1);
    assert!(h.store.contains_entity("恒丰银行"));
    assert!(outcome
        .results
        .iter()
        .any(|r| r.title.contains("恒丰银行")));
}

#[tokio::test]
async fn generic_bank_question_learns_nothing() {
    let h = harness(false);

    let outcome = h
        .ranker
        .search("介绍一下国外有哪些银行在中国有业务", SearchMode::Hybrid, 5)
        .await
        .unwrap();

    assert_eq!(h.lookup.call_count(), 0);
    assert!(outcome.results.is_empty());
    assert_eq!(h.store.len(), 0);
}

#[tokio::test]
async fn concurrent_unknown_entity_searches_learn_once() {
    let h = Arc::new(harness(false));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.ranker
                .search("恒丰银行的消费贷产品怎么样", SearchMode::Hybrid, 5)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.lookup.call_count(), 1);
    let stats = h.store.stats();
    assert_eq!(stats.total_chunks, 1);
}

#[tokio::test]
async fn digit_normalized_search_finds_thousand_separators() {
    let h = harness(false);
    h.store
        .insert(seeded_chunk(
            "收入要求",
            "申请条件：月收入：25,000元以上，工作满一年。",
            false,
        ))
        .unwrap();

    let outcome = h
        .ranker
        .search("25000", SearchMode::Text, 5)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].title, "收入要求");
}

#[tokio::test]
async fn repeat_query_after_learning_skips_lookup() {
    let h = harness(false);

    // First search learns the entity and already sees the fresh entry
    let first = h
        .ranker
        .search("恒丰银行的贷款条件", SearchMode::Text, 5)
        .await
        .unwrap();
    assert_eq!(h.lookup.call_count(), 1);
    assert!(!first.results.is_empty());

    // Repeat is a cache hit and the learned set short-circuits the lookup
    let second = h
        .ranker
        .search("恒丰银行的贷款条件", SearchMode::Text, 5)
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(h.lookup.call_count(), 1);
    assert_eq!(h.store.stats().total_chunks, 1);
}

//! Application state for the lending RAG server

use parking_lot::RwLock;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::QueryCache;
use crate::config::RagConfig;
use crate::error::Result;
use crate::ingestion::{DocumentExtractor, OcrEngine, TesseractOcr, TextChunker};
use crate::learning::{AutoLearner, EntityDetector, EntityRegistry};
use crate::providers::{
    EmbeddingProvider, LlmProvider, LookupProvider, OllamaClient, OllamaEmbedder, OllamaLlm,
    WebLookup,
};
use crate::retrieval::HybridRanker;
use crate::store::KnowledgeStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Knowledge store for chunks
    store: Arc<KnowledgeStore>,
    /// Query cache with TTL and alias invalidation
    cache: Arc<QueryCache>,
    /// Bank entity registry
    registry: Arc<EntityRegistry>,
    /// Embedding provider (Ollama)
    embedder: Arc<dyn EmbeddingProvider>,
    /// Document extractor with OCR support
    extractor: DocumentExtractor,
    /// Text chunker
    chunker: TextChunker,
    /// Hybrid search with auto-learning hook
    ranker: Arc<HybridRanker>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create new application state, wiring all components
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing lending RAG application state...");

        fs::create_dir_all(&config.storage.data_dir)?;
        let store_path = config.storage.data_dir.join("knowledge_store.json");
        let store = Arc::new(KnowledgeStore::new(
            store_path,
            config.embeddings.dimensions,
        ));
        tracing::info!("Knowledge store loaded ({} chunks)", store.len());

        let cache = Arc::new(QueryCache::new(
            config.cache.max_entries,
            config.cache.ttl_seconds,
        ));

        let ollama = Arc::new(OllamaClient::new(&config.llm));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::new(
            Arc::clone(&ollama),
            config.embeddings.dimensions,
        ));
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::new(Arc::clone(&ollama)));
        tracing::info!(
            "Ollama client initialized (embed: {}, generate: {})",
            config.llm.embed_model,
            config.llm.generate_model
        );

        let lookup: Arc<dyn LookupProvider> = Arc::new(WebLookup::new(&config.lookup));

        let registry = Arc::new(EntityRegistry::seeded());
        tracing::info!("Entity registry seeded ({} banks)", registry.len());

        let chunker = TextChunker::from_config(&config.chunking);

        let learner = Arc::new(AutoLearner::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&cache),
            chunker.clone(),
            Arc::clone(&embedder),
            Arc::clone(&lookup),
            Arc::clone(&llm),
        ));

        let detector = Arc::new(EntityDetector::new(Arc::clone(&registry)));

        let ranker = Arc::new(HybridRanker::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&embedder),
            Arc::clone(&detector),
            Arc::clone(&learner),
            Duration::from_secs(config.embeddings.query_timeout_secs),
        ));

        let ocr = TesseractOcr::new();
        let extractor = if ocr.is_available().await {
            tracing::info!("OCR engine available: {}", ocr.name());
            DocumentExtractor::with_ocr(Arc::new(ocr))
        } else {
            tracing::warn!("Tesseract not found, image and scanned-PDF text disabled");
            DocumentExtractor::new()
        };

        let inner = AppStateInner {
            config,
            store,
            cache,
            registry,
            embedder,
            extractor,
            chunker,
            ranker,
            ready: RwLock::new(true),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.registry
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn extractor(&self) -> &DocumentExtractor {
        &self.inner.extractor
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.inner.chunker
    }

    pub fn ranker(&self) -> &Arc<HybridRanker> {
        &self.inner.ranker
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }
}

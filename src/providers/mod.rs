//! Provider abstractions for embeddings, summarization, and external lookup
//!
//! Trait seams keep the retrieval core testable without a running Ollama or
//! network access.

pub mod embedding;
pub mod llm;
pub mod lookup;
pub mod ollama;
pub mod web_lookup;

pub use embedding::EmbeddingProvider;
pub use llm::{EntitySummary, LlmProvider};
pub use lookup::LookupProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
pub use web_lookup::WebLookup;

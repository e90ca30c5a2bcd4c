//! lending-rag: Lending products Q&A over a self-learning knowledge base
//!
//! Multi-format document ingestion (PDF, Office, HTML, CSV, images via OCR),
//! deterministic chunking, Ollama embeddings, hybrid vector + lexical search
//! with graceful degradation, a TTL query cache, and automatic learning of
//! unknown banks mentioned in user questions.

pub mod cache;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod learning;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{
    knowledge::{DocClass, DocumentType, ExtractedDocument, KnowledgeChunk},
    query::{SearchMode, SearchRequest},
    response::{ScoredChunk, SearchOutcome, SearchResponse},
};

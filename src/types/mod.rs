//! Core types for the retrieval core

pub mod knowledge;
pub mod query;
pub mod response;

pub use knowledge::{DocClass, DocumentType, ExtractedDocument, KnowledgeChunk};
pub use query::{AddKnowledgeRequest, IngestOptions, SearchMode, SearchRequest};
pub use response::{
    CacheStatsResponse, IngestFileResult, IngestResponse, KnowledgeStatsResponse, ScoredChunk,
    SearchOutcome, SearchResponse,
};

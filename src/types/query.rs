//! Search and ingestion request types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Retrieval strategy selection
///
/// `Hybrid` is the default and degrades to text-only when the embedding
/// backend is unreachable. `Simple` prefers vector search and falls back to
/// text on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Embedding similarity only
    Vector,
    /// Lexical matching only
    Text,
    /// Both strategies merged, text-only when embeddings are down
    #[default]
    Hybrid,
    /// Vector when available, otherwise text
    Simple,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Text => "text",
            Self::Hybrid => "hybrid",
            Self::Simple => "simple",
        }
    }
}

/// Search request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// The query text
    pub query: String,

    /// Retrieval strategy (default: hybrid)
    #[serde(default, alias = "search_type")]
    pub mode: SearchMode,

    /// Maximum number of results (default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::default(),
            max_results: default_max_results(),
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Options attached to a multipart ingest request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Category assigned to all chunks from this batch
    #[serde(default = "default_category")]
    pub category: String,
    /// Extra metadata stored on every chunk
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            category: default_category(),
            metadata: HashMap::new(),
        }
    }
}

fn default_category() -> String {
    "documents".to_string()
}

/// Direct knowledge insertion (curation path)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddKnowledgeRequest {
    pub title: String,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

//! LLM provider trait for entity summarization

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured knowledge entry produced from raw lookup text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    /// Entry title, usually the canonical entity name
    pub title: String,
    /// Condensed factual body
    pub body: String,
    /// Category the entry belongs to (e.g. "bank_info")
    pub category: String,
    /// Tags, including known aliases of the entity
    pub tags: Vec<String>,
}

/// Trait for LLM-backed summarization
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Condense raw lookup text about an entity into a structured entry
    ///
    /// Implementations must derive the body from `raw_text` only; an entity
    /// the text does not actually describe is an error, not an invitation to
    /// invent facts.
    async fn summarize_entity(&self, entity: &str, raw_text: &str) -> Result<EntitySummary>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// The model in use
    fn model(&self) -> &str;
}

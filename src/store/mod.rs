//! Persistent knowledge storage

mod knowledge_store;

pub use knowledge_store::KnowledgeStore;

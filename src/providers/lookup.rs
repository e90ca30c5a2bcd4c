//! External lookup trait for auto-learning

use async_trait::async_trait;

use crate::error::Result;

/// Trait for fetching raw factual text about an entity from an external
/// source
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Fetch raw text about an entity
    ///
    /// Returns `Error::Lookup` when nothing could be retrieved; callers turn
    /// that into a failed learning outcome rather than fabricating content.
    async fn lookup(&self, entity: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

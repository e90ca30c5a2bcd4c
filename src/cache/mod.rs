//! Query result caching

mod query_cache;

pub use query_cache::QueryCache;

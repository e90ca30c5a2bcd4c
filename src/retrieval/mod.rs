//! Search orchestration

mod ranker;

pub use ranker::HybridRanker;

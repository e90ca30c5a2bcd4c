//! Entity detection and auto-learning

mod auto_learn;
mod detector;
mod registry;

pub use auto_learn::{AutoLearner, LearnOutcome};
pub use detector::{Detection, EntityDetector};
pub use registry::EntityRegistry;

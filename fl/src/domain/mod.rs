//! Domain types: features, priorities and phases

mod feature;
mod phase;
mod priority;

pub use feature::{Feature, FeatureList};
pub use phase::Phase;
pub use priority::Priority;

//! Cached multi-facet insight generation.

pub mod batch;
pub mod cache;
pub mod facets;
pub mod generator;

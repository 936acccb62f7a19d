pub mod batch;
pub mod builder;
pub mod error;
pub mod expression;
pub mod filter;
pub mod graph;
pub mod grouping;
pub mod planner;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{QueryError, Result};

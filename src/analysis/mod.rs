//! Analysis of specialist outcomes.

pub mod aggregator;

pub use aggregator::*;

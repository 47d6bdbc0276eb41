//! Market-comparison valuation engine for residential property.
//!
//! Estimates a target property's unit price from recent comparable
//! transactions: a distance-ranked comparable selector, a classical
//! multiplicative adjustment path, a similarity-weighted aggregation path
//! with an entropy-derived confidence, and a trainable rule framework the
//! aggregator can delegate its price corrections to.

pub mod rules;
pub mod store;
pub mod valuation;

pub use valuation::pipeline::{
    estimate, estimate_at, explain, explain_at, select_comparables, train_rules,
    ComparableSelection,
};

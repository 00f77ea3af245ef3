//! Data pipeline: classifies objects dropped into a bucket and routes them
//! to processing or quarantine.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod reporting;
pub mod store;

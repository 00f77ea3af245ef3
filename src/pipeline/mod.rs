//! Classification-and-routing pipeline.
//!
//! Every object flows through:
//! 1. `classifier::classify()`: key suffix → `Classification`
//! 2. The matching transformer (`normalizer`, `archive`, `spreadsheet`, `email`)
//! 3. `processor::Pipeline`: writes results, quarantines failures
//!
//! **Bad input never fails an invocation.** It ends up in quarantine or in a
//! report, and the result is always status 200.

pub mod archive;
pub mod classifier;
pub mod downloads;
pub mod email;
pub mod normalizer;
pub mod processor;
pub mod spreadsheet;
pub mod types;

pub use processor::{Attempt, Pipeline, WriteRequest};
pub use types::{BucketKind, Classification, Handler, IncomingObject, PipelineResult, TransformOutcome};

//! The ingestion pipeline: producers page through the ledger API and feed a
//! shared queue, consumers resolve participants and persist batches.

pub mod consumer;
pub mod identity;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod ranges;

pub use consumer::ConflictPolicy;
pub use pipeline::Pipeline;

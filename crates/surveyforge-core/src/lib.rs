//! Core library for the Surveyforge academic research pipeline.
//!
//! Given a topic, the workflow discovers papers across bibliographic
//! sources, extracts structured notes through a safety-filtered language
//! model, clusters notes into themes, generates citations, and drafts a
//! survey document. The crate owns the orchestration: checkpointed stages,
//! per-source rate limiting, batched LLM extraction, and partial-failure
//! recovery. Dashboards, CLIs, concrete source HTTP clients, and export
//! renderers consume it as a library.

pub mod checkpoint;
pub mod citation;
pub mod config;
pub mod dedup;
pub mod error;
pub mod llm;
pub mod model;
pub mod ratelimit;
pub mod source;
pub mod storage;
pub mod workflow;

pub use error::*;

/// Returns the version of the surveyforge-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

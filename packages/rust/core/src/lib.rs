//! Pipeline orchestration for CourtScout.
//!
//! Ties search, page fetch, extraction, dedup, storage and export together
//! into the two run modes (`run_web_mode`, `run_conversation_mode`).

pub mod dedup;
pub mod pipeline;
pub mod report;

pub use dedup::{DedupGate, Resolution};
pub use pipeline::{
    ConversationRunConfig, GroupOutcome, Orchestrator, Provenance, RunContext, RunOutcome,
    WebRunConfig, run_conversation_mode, run_web_mode,
};
pub use report::{ProgressReporter, RunReport, SilentProgress};

//! Court extraction from model output.
//!
//! - [`parser`]: lenient recovery of the candidate-group array from free text
//! - [`prompts`]: the output-schema contract and prompt text
//! - [`single_shot`]: one request per fetched page (web mode)
//! - [`conversation`]: the multi-round, pull-based conversational extractor

pub mod conversation;
pub mod parser;
pub mod prompts;
pub mod single_shot;

#[cfg(test)]
mod testing;

pub use conversation::{Advance, ConversationExtractor, EndReason, RoundStats};
pub use parser::{locate_array, parse_candidate_groups};
pub use single_shot::{PageExtraction, extract_from_page, truncate_chars};

//! Single-shot extraction from fetched page text.

use courtscout_llm::{ChatMessage, ChatModel, ChatRequest, complete};
use courtscout_shared::{CandidateGroup, ExtractConfig, Result};
use tracing::{debug, warn};

use crate::parser::parse_candidate_groups;
use crate::prompts;

/// Result of extracting one page.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub groups: Vec<CandidateGroup>,
    /// The response had no parseable array; `groups` is empty.
    pub malformed: bool,
    pub raw_response: String,
}

/// Prefix of `content` holding at most `max_chars` characters.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

/// Send one page's text with the extraction prompt and parse the reply.
///
/// Transport failures and timeouts propagate as `TransientFetch`; a malformed
/// reply is not an error and yields zero groups.
pub async fn extract_from_page(
    model: &dyn ChatModel,
    config: &ExtractConfig,
    page_text: &str,
) -> Result<PageExtraction> {
    let content = truncate_chars(page_text, config.max_content_chars);
    let request = ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage::system(prompts::page_system_prompt()),
            ChatMessage::user(prompts::page_extraction_prompt(content)),
        ],
        json_output: true,
        enable_search: false,
    };

    let raw_response = complete(model, &request, config.request_timeout).await?;

    match parse_candidate_groups(&raw_response) {
        Ok(groups) => {
            debug!(groups = groups.len(), "page extraction parsed");
            Ok(PageExtraction {
                groups,
                malformed: false,
                raw_response,
            })
        }
        Err(e) => {
            warn!(error = %e, "page extraction response malformed, zero groups");
            Ok(PageExtraction {
                groups: Vec::new(),
                malformed: true,
                raw_response,
            })
        }
    }
}

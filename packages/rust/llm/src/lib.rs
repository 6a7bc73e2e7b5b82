//! Conversational model client.
//!
//! The extraction layer only depends on "send the message history, receive an
//! ordered stream of text fragments". [`ChatModel`] is that seam;
//! [`OpenAiCompatClient`] implements it over HTTP + SSE, and [`accumulate`]
//! assembles the fragments of one invocation into the final response text.

mod client;
mod sse;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use courtscout_shared::{CourtScoutError, Result};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

pub use client::OpenAiCompatClient;
pub use sse::SseFragments;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One model invocation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Full history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Ask for a JSON response format.
    pub json_output: bool,
    /// Let the service augment the answer with web search.
    pub enable_search: bool,
}

// ---------------------------------------------------------------------------
// ChatModel
// ---------------------------------------------------------------------------

/// Ordered text fragments of a single completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A conversational text-generation service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the request and return its fragment stream.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream>;
}

// ---------------------------------------------------------------------------
// StreamAccumulator
// ---------------------------------------------------------------------------

/// Concatenate fragments in arrival order once the stream is exhausted.
///
/// If the stream fails, the partial text is discarded and the failure is
/// reported as [`CourtScoutError::TransientFetch`].
pub async fn accumulate(mut fragments: FragmentStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(part) => text.push_str(&part),
            Err(e @ CourtScoutError::TransientFetch(_)) => return Err(e),
            Err(e) => return Err(CourtScoutError::transient(e.to_string())),
        }
    }
    Ok(text)
}

/// Send `request` and accumulate the whole response under `timeout`.
///
/// Exceeding the timeout is a [`CourtScoutError::TransientFetch`] for this call only.
pub async fn complete(
    model: &dyn ChatModel,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<String> {
    let call = async {
        let stream = model.stream_chat(request).await?;
        accumulate(stream).await
    };

    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CourtScoutError::transient(format!(
            "model call timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}

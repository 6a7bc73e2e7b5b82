//! Scripted chat model for extractor tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use courtscout_llm::{ChatModel, ChatRequest, FragmentStream};
use courtscout_shared::{CourtScoutError, Result};
use futures::StreamExt;

/// Replies with scripted responses in order and records every request.
///
/// `Ok(text)` streams the text in small fragments; `Err(msg)` streams a partial
/// fragment and then fails. An exhausted script fails the call outright.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        let items: Vec<Result<String>> = match reply {
            Some(Ok(text)) => {
                let chars: Vec<char> = text.chars().collect();
                chars
                    .chunks(7)
                    .map(|c| Ok(c.iter().collect::<String>()))
                    .collect()
            }
            Some(Err(msg)) => vec![
                Ok("[{\"success\": true,".to_string()),
                Err(CourtScoutError::transient(msg)),
            ],
            None => return Err(CourtScoutError::transient("script exhausted")),
        };
        Ok(futures::stream::iter(items).boxed())
    }
}

//! Multi-round conversational extraction.
//!
//! [`ConversationExtractor`] is a pull-based state machine: each call to
//! [`ConversationExtractor::advance`] yields the next candidate group, running
//! model rounds as needed, until the model sends the termination phrase, the
//! round cap is reached, or a round fails in transport.
//!
//! Round lifecycle: send full history, accumulate the streamed reply, check for
//! the termination phrase, parse, emit groups one by one, then replace the
//! reply in history with a names-only summary and ask the model to continue.

use courtscout_llm::{ChatMessage, ChatModel, ChatRequest, complete};
use courtscout_shared::{CandidateGroup, ExtractConfig, ExtractionRound, Location, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::parser::parse_candidate_groups;
use crate::prompts;

/// Why a conversational extraction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The model sent the termination phrase.
    Terminated,
    /// The configured round cap was reached.
    RoundCap,
    /// A round failed in transport; earlier groups stand.
    Failed,
}

/// One pull from the extractor.
#[derive(Debug, Clone)]
pub enum Advance {
    Group(CandidateGroup),
    End(EndReason),
}

/// Per-round accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundStats {
    pub round_number: u32,
    /// Groups parsed (and emitted), including `success = false` ones.
    pub groups: usize,
    pub successful: usize,
    pub malformed: bool,
    pub terminated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Send,
    Emitting { cursor: usize },
    Done(EndReason),
}

/// Pull-based driver of a multi-round court search conversation.
pub struct ConversationExtractor<'a> {
    model: &'a dyn ChatModel,
    config: ExtractConfig,
    location: Location,
    messages: Vec<ChatMessage>,
    round_number: u32,
    current: Option<ExtractionRound>,
    stats: Vec<RoundStats>,
    state: State,
}

impl<'a> ConversationExtractor<'a> {
    /// Prepare round 1: system instruction plus the initial request with the schema contract.
    pub fn new(
        model: &'a dyn ChatModel,
        config: ExtractConfig,
        location: Location,
        query: &str,
    ) -> Self {
        let messages = vec![
            ChatMessage::system(prompts::conversation_system_prompt()),
            ChatMessage::user(prompts::conversation_initial_prompt(
                &location,
                query,
                config.batch_hint,
                &config.termination_phrase,
            )),
        ];
        Self {
            model,
            config,
            location,
            messages,
            round_number: 1,
            current: None,
            stats: Vec::new(),
            state: State::Send,
        }
    }

    /// Round statistics so far, in round order.
    pub fn rounds(&self) -> &[RoundStats] {
        &self.stats
    }

    /// Conversation history that will be sent with the next round.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of the round currently in progress (or about to be sent).
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done(_))
    }

    /// Yield the next candidate group, or the end of the extraction.
    ///
    /// A transport failure is returned once as an error; every later call
    /// returns `End(Failed)`.
    pub async fn advance(&mut self) -> Result<Advance> {
        loop {
            match self.state {
                State::Done(reason) => return Ok(Advance::End(reason)),
                State::Send => {
                    if self.round_number > self.config.max_rounds {
                        info!(
                            max_rounds = self.config.max_rounds,
                            "round cap reached, ending conversation"
                        );
                        self.state = State::Done(EndReason::RoundCap);
                        continue;
                    }
                    self.run_round().await?;
                }
                State::Emitting { cursor } => {
                    let Some(round) = self.current.as_ref() else {
                        self.state = State::Send;
                        continue;
                    };
                    if let Some(group) = round.parsed_groups.get(cursor) {
                        self.state = State::Emitting { cursor: cursor + 1 };
                        return Ok(Advance::Group(group.clone()));
                    }
                    self.continue_conversation();
                }
            }
        }
    }

    /// Send, accumulate, check termination, parse. Leaves the machine in
    /// `Emitting` or `Done`.
    async fn run_round(&mut self) -> Result<()> {
        let round = self.round_number;
        debug!(round, messages = self.messages.len(), "sending round");

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: self.messages.clone(),
            json_output: true,
            enable_search: self.config.enable_search,
        };

        let raw_response =
            match complete(self.model, &request, self.config.request_timeout).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(round, error = %e, "round failed, ending conversation");
                    self.state = State::Done(EndReason::Failed);
                    return Err(e);
                }
            };

        if raw_response.contains(&self.config.termination_phrase) {
            info!(round, "termination phrase received");
            self.stats.push(RoundStats {
                round_number: round,
                groups: 0,
                successful: 0,
                malformed: false,
                terminated: true,
            });
            self.state = State::Done(EndReason::Terminated);
            return Ok(());
        }

        let (parsed_groups, malformed) = match parse_candidate_groups(&raw_response) {
            Ok(groups) => (groups, false),
            Err(e) => {
                warn!(round, error = %e, "round response malformed, zero groups");
                (Vec::new(), true)
            }
        };

        let successful = parsed_groups.iter().filter(|g| g.success).count();
        info!(round, groups = parsed_groups.len(), successful, "round parsed");
        self.stats.push(RoundStats {
            round_number: round,
            groups: parsed_groups.len(),
            successful,
            malformed,
            terminated: false,
        });

        self.current = Some(ExtractionRound {
            round_number: round,
            raw_response,
            parsed_groups,
        });
        self.state = State::Emitting { cursor: 0 };
        Ok(())
    }

    /// Replace the round's reply with a names-only summary and ask for more.
    fn continue_conversation(&mut self) {
        if let Some(round) = self.current.take() {
            let summary =
                prompts::round_summary(round.parsed_groups.iter().map(|g| g.primary.name()));
            self.messages.push(ChatMessage::assistant(summary));
        }
        self.messages.push(ChatMessage::user(prompts::continue_prompt(
            &self.location,
            &self.config.termination_phrase,
        )));
        self.round_number += 1;
        self.state = State::Send;
    }
}

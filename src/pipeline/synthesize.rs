//! Grounded answer generation.
//!
//! The message sequence is assembled in a fixed order: persona, evidence block, exemplars,
//! then the caller's conversation. Policy therefore precedes both retrieved text and user
//! turns, so neither can override it.

use crate::chat::{ChatCompletionClient, ChatMessage, CompletionRequest, OutputMode};
use crate::pipeline::citations::enforce_citation_bound;
use crate::pipeline::prompts::PromptSet;
use crate::pipeline::types::ConversationTurn;
use crate::upstream::UpstreamError;
use crate::vector::RetrievedPassage;
use std::sync::Arc;

const PASSAGE_SEPARATOR: &str = "\n---\n\n";

/// Render passages as the numbered evidence block, 1-based in retrieval order.
pub fn render_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(index, passage)| {
            format!(
                "[Источник {}: {}]\n{}\n",
                index + 1,
                passage.title,
                passage.text
            )
        })
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}

/// Produces cited answers from retrieved passages and the conversation.
pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatCompletionClient>,
    prompts: Arc<PromptSet>,
    temperature: f64,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    /// Build a synthesizer with fixed sampling parameters.
    pub fn new(
        chat: Arc<dyn ChatCompletionClient>,
        prompts: Arc<PromptSet>,
        temperature: f64,
        max_tokens: u32,
    ) -> Self {
        Self {
            chat,
            prompts,
            temperature,
            max_tokens,
        }
    }

    /// Assemble the ordered message sequence sent to the completion model.
    pub fn build_messages(
        &self,
        history: &[ConversationTurn],
        passages: &[RetrievedPassage],
    ) -> Vec<ChatMessage> {
        let mut messages =
            Vec::with_capacity(2 + self.prompts.exemplars.len() * 2 + history.len());
        messages.push(ChatMessage::system(self.prompts.persona.clone()));
        messages.push(ChatMessage::system(format!(
            "{}\n\n{}",
            self.prompts.context_preamble,
            render_context(passages)
        )));
        for exemplar in &self.prompts.exemplars {
            messages.push(ChatMessage::user(exemplar.user));
            messages.push(ChatMessage::assistant(exemplar.assistant));
        }
        messages.extend(history.iter().map(ConversationTurn::to_chat_message));
        messages
    }

    /// Generate an answer; citation markers outside the passage range are removed.
    pub async fn synthesize(
        &self,
        history: &[ConversationTurn],
        passages: &[RetrievedPassage],
    ) -> Result<String, UpstreamError> {
        let request = CompletionRequest {
            messages: self.build_messages(history, passages),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            output: OutputMode::Text,
        };

        let raw = self.chat.complete(request).await?;
        let answer = raw.trim();
        if answer.is_empty() {
            return Err(UpstreamError::malformed(
                "chat-completion",
                "answer was empty",
            ));
        }

        Ok(enforce_citation_bound(answer, passages.len()))
    }
}

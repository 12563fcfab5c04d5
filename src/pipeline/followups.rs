//! Suggested next questions derived from the last answer.

use crate::chat::{ChatCompletionClient, ChatMessage, CompletionRequest, OutputMode};
use crate::metrics::AnswerMetrics;
use crate::pipeline::prompts::PromptSet;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum number of suggestions returned to the caller.
pub const MAX_FOLLOWUPS: usize = 3;

const FOLLOWUP_TEMPERATURE: f64 = 0.5;
const FOLLOWUP_MAX_TOKENS: u32 = 200;

/// Accepted response shapes, tried in declaration order.
#[derive(Deserialize)]
#[serde(untagged)]
enum FollowupPayload {
    Bare(Vec<String>),
    Questions {
        questions: Vec<String>,
    },
    Followups {
        #[serde(alias = "follow_ups", alias = "followUps")]
        followups: Vec<String>,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
}

impl FollowupPayload {
    fn into_questions(self) -> Vec<String> {
        match self {
            Self::Bare(questions)
            | Self::Questions { questions }
            | Self::Followups {
                followups: questions,
            }
            | Self::Suggestions {
                suggestions: questions,
            } => questions,
        }
    }
}

/// Parse model output into at most [`MAX_FOLLOWUPS`] questions.
///
/// Returns `None` when the output matches none of the accepted shapes.
pub fn parse_followups(raw: &str) -> Option<Vec<String>> {
    let payload: FollowupPayload = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let mut seen = HashSet::new();
    let questions = payload
        .into_questions()
        .into_iter()
        .map(|question| question.trim().to_string())
        .filter(|question| !question.is_empty())
        .filter(|question| seen.insert(question.clone()))
        .take(MAX_FOLLOWUPS)
        .collect();
    Some(questions)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Generates suggested next questions; never fails.
pub struct FollowupGenerator {
    chat: Arc<dyn ChatCompletionClient>,
    prompts: Arc<PromptSet>,
    metrics: Arc<AnswerMetrics>,
}

impl FollowupGenerator {
    /// Build a generator over the shared chat client and prompts.
    pub fn new(
        chat: Arc<dyn ChatCompletionClient>,
        prompts: Arc<PromptSet>,
        metrics: Arc<AnswerMetrics>,
    ) -> Self {
        Self {
            chat,
            prompts,
            metrics,
        }
    }

    /// Suggest up to three follow-up questions; any failure yields an empty list.
    pub async fn suggest(&self, last_user_turn: &str, last_answer: &str) -> Vec<String> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(self.prompts.followups.clone()),
                ChatMessage::user(format!(
                    "Вопрос пользователя: {last_user_turn}\n\nОтвет консультанта:\n{last_answer}"
                )),
            ],
            temperature: FOLLOWUP_TEMPERATURE,
            max_tokens: FOLLOWUP_MAX_TOKENS,
            output: OutputMode::JsonObject,
        };

        let raw = match self.chat.complete(request).await {
            Ok(raw) => raw,
            Err(error) => {
                self.metrics.record_followup_failure();
                tracing::warn!(error = %error, kind = error.kind().as_str(), "Follow-up generation failed");
                return Vec::new();
            }
        };

        match parse_followups(&raw) {
            Some(questions) => questions,
            None => {
                self.metrics.record_followup_failure();
                tracing::warn!(raw = %raw, "Follow-up output had an unrecognized shape");
                Vec::new()
            }
        }
    }
}

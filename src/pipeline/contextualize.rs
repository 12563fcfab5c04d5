//! Rewriting context-dependent follow-ups into standalone search queries.

use crate::chat::{ChatCompletionClient, ChatMessage, CompletionRequest, OutputMode};
use crate::metrics::AnswerMetrics;
use crate::pipeline::prompts::PromptSet;
use crate::pipeline::types::ConversationTurn;
use std::sync::Arc;

/// Prior turns included alongside the latest one.
pub const HISTORY_WINDOW: usize = 5;

const REWRITE_TEMPERATURE: f64 = 0.0;
const REWRITE_MAX_TOKENS: u32 = 200;

/// Turns a multi-turn history into a query that can be embedded on its own.
///
/// Failures never propagate: the latest turn is used as-is instead.
pub struct QueryContextualizer {
    chat: Arc<dyn ChatCompletionClient>,
    prompts: Arc<PromptSet>,
    metrics: Arc<AnswerMetrics>,
}

impl QueryContextualizer {
    /// Build a contextualizer over the shared chat client and prompts.
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

    /// Return a standalone query for the latest turn of `history`.
    ///
    /// A single-turn history is returned unchanged without any network call.
    pub async fn contextualize(&self, history: &[ConversationTurn]) -> String {
        let Some((latest, prior)) = history.split_last() else {
            return String::new();
        };
        if prior.is_empty() {
            return latest.content.clone();
        }

        let request = CompletionRequest {
            messages: self.build_messages(latest, prior),
            temperature: REWRITE_TEMPERATURE,
            max_tokens: REWRITE_MAX_TOKENS,
            output: OutputMode::Text,
        };

        match self.chat.complete(request).await {
            Ok(raw) => match clean_rewrite(&raw) {
                Some(rewritten) => {
                    tracing::debug!(original = %latest.content, rewritten = %rewritten, "Query contextualized");
                    rewritten
                }
                None => self.fall_back(latest, "blank rewrite"),
            },
            Err(error) => self.fall_back(latest, &error.to_string()),
        }
    }

    /// Instruction, the last [`HISTORY_WINDOW`] prior turns verbatim, then the latest turn.
    pub fn build_messages(
        &self,
        latest: &ConversationTurn,
        prior: &[ConversationTurn],
    ) -> Vec<ChatMessage> {
        let window_start = prior.len().saturating_sub(HISTORY_WINDOW);
        let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
        messages.push(ChatMessage::system(self.prompts.contextualizer.clone()));
        messages.extend(prior[window_start..].iter().map(ConversationTurn::to_chat_message));
        messages.push(latest.to_chat_message());
        messages
    }

    fn fall_back(&self, latest: &ConversationTurn, reason: &str) -> String {
        self.metrics.record_contextualizer_fallback();
        tracing::warn!(reason, "Contextualization failed; searching with the raw question");
        latest.content.clone()
    }
}

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('«', '»'), ('“', '”')];

/// Trim the rewrite and unwrap quote pairs enclosing the whole text.
fn clean_rewrite(raw: &str) -> Option<String> {
    let mut cleaned = raw.trim();
    while let Some(inner) = enclosed(cleaned) {
        cleaned = inner.trim();
    }
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn enclosed(text: &str) -> Option<&str> {
    QUOTE_PAIRS
        .iter()
        .find_map(|&(open, close)| text.strip_prefix(open)?.strip_suffix(close))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;
    use crate::upstream::UpstreamError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::sync::Mutex;

    struct RecordingChat {
        reply: Result<String, StatusCode>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingChat {
        fn new(reply: Result<String, StatusCode>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompletionClient for RecordingChat {
        async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
            self.requests.lock().await.push(request);
            self.reply.clone().map_err(|status| UpstreamError::Service {
                service: "chat-completion",
                status,
                body: String::new(),
            })
        }
    }

    fn contextualizer(chat: Arc<RecordingChat>) -> (QueryContextualizer, Arc<AnswerMetrics>) {
        let metrics = Arc::new(AnswerMetrics::new());
        let contextualizer =
            QueryContextualizer::new(chat, Arc::new(PromptSet::default()), metrics.clone());
        (contextualizer, metrics)
    }

    fn conversation() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("Какие льготы есть?"),
            ConversationTurn::assistant("Есть повышающий коэффициент 1,5 [Источник 1]."),
            ConversationTurn::user("А документы для этого?"),
        ]
    }

    #[tokio::test]
    async fn single_turn_skips_the_network() {
        let chat = RecordingChat::new(Ok("unused".into()));
        let (contextualizer, _) = contextualizer(chat.clone());

        let query = contextualizer
            .contextualize(&[ConversationTurn::user("Какие льготы есть для НИОКР?")])
            .await;

        assert_eq!(query, "Какие льготы есть для НИОКР?");
        assert!(chat.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn multi_turn_returns_rewrite() {
        let chat = RecordingChat::new(Ok(
            "«Какие документы нужны для налоговых льгот на НИОКР?»".into()
        ));
        let (contextualizer, metrics) = contextualizer(chat.clone());

        let query = contextualizer.contextualize(&conversation()).await;

        assert_eq!(query, "Какие документы нужны для налоговых льгот на НИОКР?");
        assert_ne!(query, "А документы для этого?");
        assert_eq!(metrics.snapshot().contextualizer_fallbacks, 0);

        let requests = chat.requests.lock().await;
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].content, "Какие льготы есть?");
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[3].content, "А документы для этого?");
    }

    #[tokio::test]
    async fn failure_falls_back_to_raw_turn() {
        let chat = RecordingChat::new(Err(StatusCode::INTERNAL_SERVER_ERROR));
        let (contextualizer, metrics) = contextualizer(chat);

        let query = contextualizer.contextualize(&conversation()).await;

        assert_eq!(query, "А документы для этого?");
        assert_eq!(metrics.snapshot().contextualizer_fallbacks, 1);
    }

    #[tokio::test]
    async fn blank_rewrite_falls_back_to_raw_turn() {
        let chat = RecordingChat::new(Ok("  \"\" ".into()));
        let (contextualizer, metrics) = contextualizer(chat);

        let query = contextualizer.contextualize(&conversation()).await;

        assert_eq!(query, "А документы для этого?");
        assert_eq!(metrics.snapshot().contextualizer_fallbacks, 1);
    }

    #[test]
    fn rewrite_keeps_quotes_inside_the_text() {
        assert_eq!(
            clean_rewrite("Что такое «НИОКР»").as_deref(),
            Some("Что такое «НИОКР»")
        );
        assert_eq!(
            clean_rewrite(" \"«Что такое «НИОКР»»\" ").as_deref(),
            Some("Что такое «НИОКР»")
        );
        assert_eq!(
            clean_rewrite("'Льготы' для \"ИТ\"").as_deref(),
            Some("'Льготы' для \"ИТ\"")
        );
        assert_eq!(clean_rewrite("«»"), None);
    }

    #[test]
    fn history_window_keeps_last_five_prior_turns() {
        let chat = RecordingChat::new(Ok(String::new()));
        let (contextualizer, _) = contextualizer(chat);
        let prior: Vec<_> = (0..8)
            .map(|index| ConversationTurn::user(format!("turn {index}")))
            .collect();
        let latest = ConversationTurn::user("latest");

        let messages = contextualizer.build_messages(&latest, &prior);

        assert_eq!(messages.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(messages[1].content, "turn 3");
        assert_eq!(messages[5].content, "turn 7");
        assert_eq!(messages[6].content, "latest");
    }
}

//! Pipeline orchestrator sequencing contextualization, retrieval, synthesis, and follow-ups.

use crate::{
    chat::{ChatCompletionClient, ChatSettings, OpenAiChatClient},
    config::Config,
    embedding::{EmbeddingClient, EmbeddingSettings, OpenAiEmbeddingClient},
    metrics::{AnswerMetrics, MetricsSnapshot},
    pipeline::{
        contextualize::QueryContextualizer,
        followups::FollowupGenerator,
        mappers::dedupe_titles,
        prompts::PromptSet,
        synthesize::AnswerSynthesizer,
        types::{
            ChatInput, ConversationTurn, Outcome, PipelineError, PipelineResult, latest_question,
        },
    },
    upstream::UpstreamError,
    vector::{PineconeIndex, PineconeSettings, VectorRetriever},
};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Returned when the index holds nothing relevant to the question.
pub const NO_KNOWLEDGE_ANSWER: &str = "К сожалению, я не нашёл релевантной информации в базе \
знаний для ответа на ваш вопрос. Попробуйте переформулировать вопрос или уточнить детали.";

/// Returned when embedding or retrieval fails.
pub const RETRIEVAL_UNAVAILABLE_ANSWER: &str = "Извините, сейчас не удалось обратиться к базе \
знаний. Пожалуйста, повторите вопрос через несколько минут.";

/// Returned when the request carries no question.
pub const EMPTY_QUESTION_ANSWER: &str = "Пожалуйста, сформулируйте вопрос.";

/// Returned when the whole run exceeds the configured deadline.
pub const DEADLINE_ANSWER: &str = "Извините, подготовка ответа заняла слишком много времени. \
Пожалуйста, повторите вопрос позже.";

/// Tunables of the orchestrated run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Sampling temperature for answer synthesis.
    pub answer_temperature: f64,
    /// Output ceiling for answer synthesis.
    pub answer_max_tokens: u32,
    /// Optional bound on the whole chain; `None` leaves only per-call budgets.
    pub deadline: Option<Duration>,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            answer_temperature: config.answer_temperature,
            answer_max_tokens: config.answer_max_tokens,
            deadline: config.pipeline_deadline_secs.map(Duration::from_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            answer_temperature: 0.3,
            answer_max_tokens: 1500,
            deadline: None,
        }
    }
}

/// Retrieval-augmented answer pipeline.
///
/// Every stage is held behind a trait object so the orchestrator can be exercised with stubs.
/// The pipeline keeps no request-scoped state; one instance is shared by all concurrent
/// requests through an `Arc`.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    retriever: Arc<dyn VectorRetriever>,
    contextualizer: QueryContextualizer,
    synthesizer: AnswerSynthesizer,
    followups: FollowupGenerator,
    deadline: Option<Duration>,
    metrics: Arc<AnswerMetrics>,
}

impl RagPipeline {
    /// Assemble a pipeline from its stage clients.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        retriever: Arc<dyn VectorRetriever>,
        chat: Arc<dyn ChatCompletionClient>,
        prompts: Arc<PromptSet>,
        settings: PipelineSettings,
    ) -> Self {
        let metrics = Arc::new(AnswerMetrics::new());
        Self {
            embedder,
            retriever,
            contextualizer: QueryContextualizer::new(
                chat.clone(),
                prompts.clone(),
                metrics.clone(),
            ),
            synthesizer: AnswerSynthesizer::new(
                chat.clone(),
                prompts.clone(),
                settings.answer_temperature,
                settings.answer_max_tokens,
            ),
            followups: FollowupGenerator::new(chat, prompts, metrics.clone()),
            deadline: settings.deadline,
            metrics,
        }
    }

    /// Build the production pipeline against OpenAI and Pinecone.
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(concat!("rdconsult/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| UpstreamError::Transport {
                service: "http-client",
                source,
            })?;

        let embedder = OpenAiEmbeddingClient::with_client(
            http.clone(),
            EmbeddingSettings::from_config(config),
        );
        let retriever =
            PineconeIndex::with_client(http.clone(), PineconeSettings::from_config(config));
        let chat = OpenAiChatClient::with_client(http, ChatSettings::from_config(config));

        tracing::info!(
            embedding_model = %config.embedding_model,
            chat_model = %config.chat_model,
            top_k = config.top_k,
            deadline_secs = ?config.pipeline_deadline_secs,
            "RAG pipeline initialized"
        );

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(retriever),
            Arc::new(chat),
            Arc::new(PromptSet::default()),
            PipelineSettings::from_config(config),
        ))
    }

    /// Answer a question or conversation. Never fails: stage errors become fallback answers.
    pub async fn answer(&self, input: ChatInput, conversation_id: Option<String>) -> PipelineResult {
        let started = Instant::now();
        let turns = input.into_turns();

        let result = if latest_question(&turns).is_some() {
            self.run_bounded(&turns).await
        } else {
            tracing::info!(turns = turns.len(), "Request carried no question");
            PipelineResult::fallback(EMPTY_QUESTION_ANSWER, Outcome::EmptyQuestion)
        };
        let result = result.with_conversation_id(conversation_id);

        self.metrics.record_outcome(&result.outcome);
        tracing::info!(
            outcome = ?result.outcome,
            turns = turns.len(),
            sources = result.sources.len(),
            followups = result.followups.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answer produced"
        );
        result
    }

    /// Current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn run_bounded(&self, turns: &[ConversationTurn]) -> PipelineResult {
        let outcome = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(turns))
                .await
                .unwrap_or(Err(PipelineError::Deadline(deadline))),
            None => self.run(turns).await,
        };
        outcome.unwrap_or_else(degraded)
    }

    async fn run(&self, turns: &[ConversationTurn]) -> Result<PipelineResult, PipelineError> {
        let query = self.contextualizer.contextualize(turns).await;

        let vector = self
            .embedder
            .embed(&query)
            .await
            .map_err(PipelineError::Embedding)?;

        let passages = self
            .retriever
            .search(vector)
            .await
            .map_err(PipelineError::Retrieval)?;
        if passages.is_empty() {
            tracing::info!(query = %query, "No relevant passages retrieved");
            return Ok(PipelineResult::fallback(
                NO_KNOWLEDGE_ANSWER,
                Outcome::NoKnowledge,
            ));
        }
        tracing::debug!(passages = passages.len(), "Passages retrieved");

        let answer = self
            .synthesizer
            .synthesize(turns, &passages)
            .await
            .map_err(PipelineError::Synthesis)?;

        let question = latest_question(turns).unwrap_or(query.as_str());
        let followups = self.followups.suggest(question, &answer).await;

        Ok(PipelineResult::grounded(
            answer,
            dedupe_titles(&passages),
            followups,
        ))
    }
}

fn degraded(error: PipelineError) -> PipelineResult {
    let stage = error.stage();
    let kind = error.kind();
    tracing::error!(
        stage = stage.as_str(),
        kind = kind.as_str(),
        error = %error,
        "Pipeline stage failed"
    );

    let answer = match &error {
        PipelineError::Embedding(_) | PipelineError::Retrieval(_) => {
            RETRIEVAL_UNAVAILABLE_ANSWER.to_string()
        }
        PipelineError::Synthesis(source) => {
            format!(
                "Произошла ошибка при обработке запроса: {}",
                source.summary()
            )
        }
        PipelineError::Deadline(_) => DEADLINE_ANSWER.to_string(),
    };
    PipelineResult::fallback(answer, Outcome::Degraded { stage, kind })
}

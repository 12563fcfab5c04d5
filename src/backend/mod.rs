//! Interchangeable answer backends behind one `answer(question) -> result` contract.
//!
//! [`RagPipeline`] is the production path. The notebook adapters delegate to an external
//! notebook service and are kept as alternates selectable through `CHAT_BACKEND`.

mod notebook_cli;
mod notebook_mcp;

pub use notebook_cli::{NotebookCliBackend, NotebookCliSettings};
pub use notebook_mcp::{NotebookMcpBackend, NotebookMcpSettings, clean_answer};

use crate::{
    config::{ChatBackend, Config},
    metrics::MetricsSnapshot,
    pipeline::{ChatInput, FailureKind, Outcome, PipelineResult, RagPipeline, Stage},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Answer returned when the notebook produced no text.
pub const NOTEBOOK_EMPTY_ANSWER: &str = "NotebookLM не смог найти ответ на ваш запрос.";

/// Contract shared by every answer backend.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Answer a question or conversation. Implementations never fail.
    async fn answer(&self, input: ChatInput, conversation_id: Option<String>) -> PipelineResult;

    /// Stable backend identifier reported by health checks.
    fn name(&self) -> &'static str;

    /// Current answer counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

#[async_trait]
impl AnswerBackend for RagPipeline {
    async fn answer(&self, input: ChatInput, conversation_id: Option<String>) -> PipelineResult {
        RagPipeline::answer(self, input, conversation_id).await
    }

    fn name(&self) -> &'static str {
        ChatBackend::Rag.as_str()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagPipeline::metrics_snapshot(self)
    }
}

/// Failures of the notebook adapters; converted to fallback answers before leaving the backend.
#[derive(Debug, Error)]
pub enum NotebookError {
    /// No notebook identifier was configured.
    #[error("NOTEBOOK_ID is not configured")]
    MissingNotebook,
    /// The external process could not be started.
    #[error("failed to launch {command}: {source}")]
    Spawn {
        /// Executable that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The external process exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    Command {
        /// Executable that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The MCP exchange failed.
    #[error("MCP exchange failed: {0}")]
    Protocol(String),
    /// The notebook service reported a tool-level error.
    #[error("notebook tool returned an error: {0}")]
    Tool(String),
    /// The exchange exceeded its budget.
    #[error("no answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl NotebookError {
    /// Map the error onto the coarse failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Tool(_) => FailureKind::MalformedResponse,
            _ => FailureKind::ServiceError,
        }
    }
}

/// Convert a notebook exchange into a result; notebook answers carry no passage titles.
pub(crate) fn notebook_result(
    backend: &'static str,
    exchange: Result<String, NotebookError>,
) -> PipelineResult {
    match exchange {
        Ok(answer) if !answer.trim().is_empty() => {
            PipelineResult::grounded(answer.trim().to_string(), Vec::new(), Vec::new())
        }
        Ok(_) => PipelineResult::fallback(NOTEBOOK_EMPTY_ANSWER, Outcome::NoKnowledge),
        Err(error) => {
            let kind = error.kind();
            tracing::error!(backend, kind = kind.as_str(), error = %error, "Notebook query failed");
            PipelineResult::fallback(
                format!("Ошибка при обращении к NotebookLM: {error}"),
                Outcome::Degraded {
                    stage: Stage::Backend,
                    kind,
                },
            )
        }
    }
}

/// Build the backend selected by the configuration.
pub fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn AnswerBackend>> {
    let backend: Arc<dyn AnswerBackend> = match config.chat_backend {
        ChatBackend::Rag => Arc::new(RagPipeline::from_config(config)?),
        ChatBackend::NotebookMcp => Arc::new(NotebookMcpBackend::new(
            NotebookMcpSettings::from_config(config),
        )),
        ChatBackend::NotebookCli => Arc::new(NotebookCliBackend::new(
            NotebookCliSettings::from_config(config),
        )),
    };
    tracing::info!(backend = backend.name(), "Answer backend ready");
    Ok(backend)
}

//! Notebook backend speaking MCP to a child-process server over stdio.

use super::{AnswerBackend, NotebookError, notebook_result};
use crate::{
    config::{ChatBackend, Config},
    metrics::{AnswerMetrics, MetricsSnapshot},
    pipeline::{ChatInput, EMPTY_QUESTION_ANSWER, Outcome, PipelineResult, latest_question},
};
use async_trait::async_trait;
use regex::Regex;
use rmcp::{
    ServiceExt,
    handler::client::ClientHandler,
    model::{CallToolRequestParam, ClientInfo, JsonObject},
    transport::TokioChildProcess,
};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

const QUERY_TOOL: &str = "notebook_query";
const CLIENT_NAME: &str = "rd-consultant-client";

/// Persona prepended to every notebook query; the question follows the trailing label.
pub const NOTEBOOK_MCP_PERSONA: &str = "\
Отвечай как профессиональный консультант по учету НИОКР и налогообложению.
Твой тон: практичный, экспертный, помогающий решить проблему.
Используй четкую структуру: заголовки (###), списки и абзацы.
ВАЖНО:
1. Не используй ссылки в формате [1], [2] и т.д. в самом тексте.
2. Давай практические советы (\"Что делать\").
3. Если вопрос касается налогов, упоминай риски или льготы.
4. Если пользователь задает уточняющий вопрос, отвечай в контексте предыдущего диалога.

Запрос пользователя:
";

/// Launch and query settings for the notebook MCP server.
#[derive(Debug, Clone)]
pub struct NotebookMcpSettings {
    /// Server executable.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Notebook queried by the `notebook_query` tool.
    pub notebook_id: Option<String>,
    /// Budget for the whole spawn, handshake, and tool call.
    pub timeout: Duration,
}

impl NotebookMcpSettings {
    /// Derive settings from the loaded configuration; the command is split on whitespace.
    pub fn from_config(config: &Config) -> Self {
        let mut parts = config.notebook_mcp_command.split_whitespace().map(str::to_string);
        Self {
            program: parts.next().unwrap_or_default(),
            args: parts.collect(),
            notebook_id: config.notebook_id.clone(),
            timeout: config.upstream_timeout(),
        }
    }
}

#[derive(Clone, Default)]
struct NotebookClientHandler;

impl ClientHandler for NotebookClientHandler {
    fn get_info(&self) -> ClientInfo {
        let mut info = ClientInfo::default();
        info.client_info.name = CLIENT_NAME.into();
        info.client_info.version = env!("CARGO_PKG_VERSION").into();
        info
    }
}

/// Answer backend delegating to a notebook MCP server spawned per request.
pub struct NotebookMcpBackend {
    settings: NotebookMcpSettings,
    metrics: AnswerMetrics,
}

impl NotebookMcpBackend {
    /// Create the backend; nothing is spawned until the first question.
    pub fn new(settings: NotebookMcpSettings) -> Self {
        tracing::debug!(
            program = %settings.program,
            has_notebook = settings.notebook_id.is_some(),
            "Initialized notebook MCP backend"
        );
        Self {
            settings,
            metrics: AnswerMetrics::new(),
        }
    }

    async fn query(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<String, NotebookError> {
        let notebook_id = self
            .settings
            .notebook_id
            .as_deref()
            .ok_or(NotebookError::MissingNotebook)?;
        let prompt = format!("{NOTEBOOK_MCP_PERSONA}{question}");

        tokio::time::timeout(
            self.settings.timeout,
            self.exchange(notebook_id, &prompt, conversation_id),
        )
        .await
        .map_err(|_| NotebookError::Timeout(self.settings.timeout))?
    }

    async fn exchange(
        &self,
        notebook_id: &str,
        prompt: &str,
        conversation_id: Option<&str>,
    ) -> Result<String, NotebookError> {
        let mut command = Command::new(&self.settings.program);
        command.args(&self.settings.args).kill_on_drop(true);
        let transport = TokioChildProcess::new(command).map_err(|source| NotebookError::Spawn {
            command: self.settings.program.clone(),
            source,
        })?;

        let client = NotebookClientHandler
            .serve(transport)
            .await
            .map_err(|error| NotebookError::Protocol(error.to_string()))?;
        tracing::debug!("Notebook MCP session initialized");

        let response = client
            .call_tool(CallToolRequestParam {
                name: QUERY_TOOL.into(),
                arguments: Some(query_arguments(notebook_id, prompt, conversation_id)),
            })
            .await;
        if let Err(error) = client.cancel().await {
            tracing::debug!(error = %error, "Notebook MCP session did not shut down cleanly");
        }
        let response = response.map_err(|error| NotebookError::Protocol(error.to_string()))?;

        let payload = serde_json::to_value(&response)
            .map_err(|error| NotebookError::Protocol(error.to_string()))?;
        let text = joined_text(&payload);
        if payload.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(NotebookError::Tool(text));
        }
        Ok(clean_answer(&text))
    }
}

#[async_trait]
impl AnswerBackend for NotebookMcpBackend {
    async fn answer(&self, input: ChatInput, conversation_id: Option<String>) -> PipelineResult {
        let started = Instant::now();
        let turns = input.into_turns();

        let result = match latest_question(&turns) {
            Some(question) => notebook_result(
                self.name(),
                self.query(question, conversation_id.as_deref()).await,
            ),
            None => PipelineResult::fallback(EMPTY_QUESTION_ANSWER, Outcome::EmptyQuestion),
        };
        let result = result.with_conversation_id(conversation_id);

        self.metrics.record_outcome(&result.outcome);
        tracing::info!(
            backend = self.name(),
            outcome = ?result.outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answer produced"
        );
        result
    }

    fn name(&self) -> &'static str {
        ChatBackend::NotebookMcp.as_str()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn query_arguments(notebook_id: &str, query: &str, conversation_id: Option<&str>) -> JsonObject {
    let mut arguments = JsonObject::new();
    arguments.insert("notebook_id".into(), Value::from(notebook_id));
    arguments.insert("query".into(), Value::from(query));
    if let Some(conversation_id) = conversation_id {
        arguments.insert("conversation_id".into(), Value::from(conversation_id));
    }
    arguments
}

/// Concatenate the `text` items of a serialized tool result.
fn joined_text(payload: &Value) -> String {
    payload
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect()
}

fn numeric_citations() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r" ?\[\d+(?:,\s*\d+)*\]| ?\[\d+-\d+\]").expect("citation pattern is valid")
    })
}

/// Normalize notebook output into plain answer text.
///
/// Unwraps an embedded `{"answer": ...}` object (innermost first), restores escaped
/// newlines and tabs, and strips numeric citation markers such as `[1]`, `[1, 2]`, `[1-3]`.
pub fn clean_answer(raw: &str) -> String {
    if raw.contains("\"answer\"")
        && let Some(inner) = embedded_answer(raw)
    {
        return clean_answer(&inner);
    }

    let text = raw
        .replace("\\n", "\n")
        .replace("\\r", "")
        .replace("\\t", "\t");
    numeric_citations()
        .replace_all(&text, "")
        .trim()
        .to_string()
}

fn embedded_answer(text: &str) -> Option<String> {
    text.match_indices('{').rev().find_map(|(start, _)| {
        let candidate = &text[start..];
        let end = balanced_object_end(candidate)?;
        let value: Value = serde_json::from_str(&candidate[..end]).ok()?;
        value.get("answer")?.as_str().map(str::to_string)
    })
}

fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use serde_json::json;

    #[test]
    fn unwraps_embedded_answer_object() {
        let raw = r#"{"status":"success","answer":"Вычет доступен [1].\nНужен отчёт [2, 3]","conversation_id":"c-1"}"#;
        assert_eq!(clean_answer(raw), "Вычет доступен.\nНужен отчёт");
    }

    #[test]
    fn restores_escapes_and_strips_ranges() {
        assert_eq!(
            clean_answer("### Вывод [1-3]\\n\\tПункт первый [4]"),
            "### Вывод\n\tПункт первый"
        );
    }

    #[test]
    fn keeps_plain_text_without_markers() {
        assert_eq!(clean_answer("  Ответ без ссылок.  "), "Ответ без ссылок.");
    }

    #[test]
    fn arguments_include_conversation_when_present() {
        let with = query_arguments("nb-1", "вопрос", Some("conv-7"));
        assert_eq!(with["notebook_id"], "nb-1");
        assert_eq!(with["query"], "вопрос");
        assert_eq!(with["conversation_id"], "conv-7");

        let without = query_arguments("nb-1", "вопрос", None);
        assert!(!without.contains_key("conversation_id"));
    }

    #[test]
    fn joins_only_text_content() {
        let payload = json!({
            "content": [
                { "type": "text", "text": "Первая часть. " },
                { "type": "image", "data": "AAAA", "mimeType": "image/png" },
                { "type": "text", "text": "Вторая часть." }
            ],
            "isError": false
        });
        assert_eq!(joined_text(&payload), "Первая часть. Вторая часть.");
        assert_eq!(joined_text(&json!({})), "");
    }

    #[test]
    fn persona_ends_with_query_label() {
        assert!(NOTEBOOK_MCP_PERSONA.trim_end().ends_with("Запрос пользователя:"));
    }

    fn settings(program: &str, notebook_id: Option<&str>) -> NotebookMcpSettings {
        NotebookMcpSettings {
            program: program.to_string(),
            args: Vec::new(),
            notebook_id: notebook_id.map(str::to_string),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_notebook_is_reported_in_answer() {
        let backend = NotebookMcpBackend::new(settings("notebooklm-mcp", None));

        let result = backend.answer("Какие льготы?".into(), None).await;

        assert_eq!(
            result.answer,
            "Ошибка при обращении к NotebookLM: NOTEBOOK_ID is not configured"
        );
        assert!(matches!(
            result.outcome,
            Outcome::Degraded {
                stage: Stage::Backend,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unlaunchable_server_degrades() {
        let backend =
            NotebookMcpBackend::new(settings("/nonexistent/notebooklm-mcp", Some("nb-1")));

        let result = backend
            .answer("Какие льготы?".into(), Some("conv-1".into()))
            .await;

        assert!(result.answer.starts_with("Ошибка при обращении к NotebookLM:"));
        assert!(result.sources.is_empty());
        assert_eq!(result.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(backend.metrics_snapshot().degraded, 1);
    }

    #[tokio::test]
    async fn empty_question_skips_the_server() {
        let backend = NotebookMcpBackend::new(settings("/nonexistent/notebooklm-mcp", Some("nb-1")));

        let result = backend.answer("".into(), None).await;

        assert_eq!(result.answer, EMPTY_QUESTION_ANSWER);
        assert_eq!(result.outcome, Outcome::EmptyQuestion);
    }
}

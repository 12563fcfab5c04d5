//! Notebook backend shelling out to the `nlm` query CLI.

use super::{AnswerBackend, NotebookError, notebook_result};
use crate::{
    config::{ChatBackend, Config},
    metrics::{AnswerMetrics, MetricsSnapshot},
    pipeline::{ChatInput, EMPTY_QUESTION_ANSWER, Outcome, PipelineResult, latest_question},
};
use async_trait::async_trait;
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Persona prepended to every CLI query.
pub const NOTEBOOK_CLI_PERSONA: &str = "\
Ты - профессиональный консультант по научно-исследовательским и опытно-конструкторским \
работам (НИОКР) в России. Твоя задача - помогать компаниям и исследователям с вопросами, \
связанными с:
- Налоговыми льготами и вычетами на НИОКР
- Грантами и субсидиями на исследования
- Оформлением документации для НИОКР
- Патентованием и защитой интеллектуальной собственности
- Организацией и проведением научных исследований

Отвечай кратко, по существу, используя только проверенную информацию из базы знаний. Если \
информации нет - честно скажи об этом.

Вопрос пользователя: ";

/// Settings for the notebook query CLI.
#[derive(Debug, Clone)]
pub struct NotebookCliSettings {
    /// CLI executable.
    pub program: String,
    /// Notebook passed to `query`.
    pub notebook_id: Option<String>,
    /// Executable run before each query to refresh credentials.
    pub auth_program: Option<String>,
    /// Budget for the auth step and the query together.
    pub timeout: Duration,
}

impl NotebookCliSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.notebook_cli_command.clone(),
            notebook_id: config.notebook_id.clone(),
            auth_program: config.notebook_auth_command.clone(),
            timeout: config.upstream_timeout(),
        }
    }
}

/// Answer backend running `nlm query <notebook> <prompt>` per request.
pub struct NotebookCliBackend {
    settings: NotebookCliSettings,
    metrics: AnswerMetrics,
}

impl NotebookCliBackend {
    /// Create the backend.
    pub fn new(settings: NotebookCliSettings) -> Self {
        Self {
            settings,
            metrics: AnswerMetrics::new(),
        }
    }

    async fn query(&self, question: &str) -> Result<String, NotebookError> {
        let notebook_id = self
            .settings
            .notebook_id
            .as_deref()
            .ok_or(NotebookError::MissingNotebook)?;

        tokio::time::timeout(self.settings.timeout, async {
            if let Some(auth) = &self.settings.auth_program {
                run(Command::new(auth)).await?;
            }
            let mut command = Command::new(&self.settings.program);
            command
                .arg("query")
                .arg(notebook_id)
                .arg(format!("{NOTEBOOK_CLI_PERSONA}{question}"));
            let output = run(command).await?;
            Ok::<_, NotebookError>(String::from_utf8_lossy(&output.stdout).trim().to_string())
        })
        .await
        .map_err(|_| NotebookError::Timeout(self.settings.timeout))?
    }
}

async fn run(mut command: Command) -> Result<Output, NotebookError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| NotebookError::Spawn {
            command: program.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(NotebookError::Command {
            command: program,
            status: output.status.to_string(),
            stderr,
        });
    }
    if !stderr.is_empty() {
        tracing::warn!(command = %program, stderr = %stderr, "Notebook CLI wrote to stderr");
    }
    Ok(output)
}

#[async_trait]
impl AnswerBackend for NotebookCliBackend {
    async fn answer(&self, input: ChatInput, conversation_id: Option<String>) -> PipelineResult {
        let started = Instant::now();
        let turns = input.into_turns();

        let result = match latest_question(&turns) {
            Some(question) => notebook_result(self.name(), self.query(question).await),
            None => PipelineResult::fallback(EMPTY_QUESTION_ANSWER, Outcome::EmptyQuestion),
        };
        // The CLI has no conversation support; the identifier is only echoed back.
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
        ChatBackend::NotebookCli.as_str()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::NOTEBOOK_EMPTY_ANSWER;

    fn backend(program: &str, auth: Option<&str>) -> NotebookCliBackend {
        NotebookCliBackend::new(NotebookCliSettings {
            program: program.to_string(),
            notebook_id: Some("nb-42".into()),
            auth_program: auth.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn stdout_becomes_the_answer() {
        let result = backend("echo", Some("true"))
            .answer("Какие льготы?".into(), Some("conv-1".into()))
            .await;

        assert!(result.answer.starts_with("query nb-42 Ты - профессиональный консультант"));
        assert!(result.answer.ends_with("Вопрос пользователя: Какие льготы?"));
        assert_eq!(result.outcome, Outcome::Grounded);
        assert_eq!(result.conversation_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn silent_cli_reports_missing_answer() {
        let result = backend("true", None).answer("Какие льготы?".into(), None).await;
        assert_eq!(result.answer, NOTEBOOK_EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn failing_auth_step_is_reported() {
        let backend = backend("echo", Some("false"));

        let result = backend.answer("Какие льготы?".into(), None).await;

        assert!(
            result
                .answer
                .starts_with("Ошибка при обращении к NotebookLM: false exited with")
        );
        assert_eq!(backend.metrics_snapshot().degraded, 1);
    }

    #[tokio::test]
    async fn slow_cli_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let script = std::env::temp_dir().join(format!("slow-nlm-{}.sh", std::process::id()));
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        let backend = NotebookCliBackend::new(NotebookCliSettings {
            program: script.to_string_lossy().into_owned(),
            notebook_id: Some("nb-42".into()),
            auth_program: None,
            timeout: Duration::from_millis(200),
        });

        let result = backend.answer("вопрос".into(), None).await;

        std::fs::remove_file(&script).ok();
        assert_eq!(result.outcome.error_code().as_deref(), Some("backend_timeout"));
    }
}

//! Core data types and error definitions for the answer pipeline.

use crate::chat::{ChatMessage, ChatRole};
use crate::upstream::{FailureKind, UpstreamError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Person asking questions.
    User,
    /// Consultant answers.
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        }
    }
}

/// One message of a conversation, supplied by the caller on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// Caller-assigned identifier.
    pub id: String,
    /// Author of the turn.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Creation time, when the caller tracks it.
    pub created_at: Option<OffsetDateTime>,
    /// Source titles attached to an assistant turn.
    pub sources: Vec<String>,
    /// Follow-up suggestions attached to an assistant turn.
    pub followups: Vec<String>,
}

impl ConversationTurn {
    /// User turn with a fresh identifier.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant turn with a fresh identifier.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Turn with a fresh identifier and no attachments.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Some(OffsetDateTime::now_utc()),
            sources: Vec::new(),
            followups: Vec::new(),
        }
    }

    /// Chat message carrying this turn verbatim.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.into(),
            content: self.content.clone(),
        }
    }
}

/// Question input accepted by the pipeline.
#[derive(Debug, Clone)]
pub enum ChatInput {
    /// A bare question; treated as a one-turn conversation.
    Message(String),
    /// Full conversation ending with the latest user turn.
    Turns(Vec<ConversationTurn>),
}

impl ChatInput {
    /// Normalize into an ordered turn sequence.
    pub fn into_turns(self) -> Vec<ConversationTurn> {
        match self {
            Self::Message(text) => vec![ConversationTurn::user(text)],
            Self::Turns(turns) => turns,
        }
    }
}

impl From<String> for ChatInput {
    fn from(text: String) -> Self {
        Self::Message(text)
    }
}

impl From<&str> for ChatInput {
    fn from(text: &str) -> Self {
        Self::Message(text.to_string())
    }
}

impl From<Vec<ConversationTurn>> for ChatInput {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self::Turns(turns)
    }
}

/// Content of the final turn when it is a non-blank user question.
pub fn latest_question(turns: &[ConversationTurn]) -> Option<&str> {
    turns
        .last()
        .filter(|turn| turn.role == Role::User && !turn.content.trim().is_empty())
        .map(|turn| turn.content.as_str())
}

/// Pipeline stage named in degraded outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Query embedding.
    Embedding,
    /// Vector index lookup.
    Retrieval,
    /// Answer generation.
    Synthesis,
    /// Global deadline covering the whole run.
    Deadline,
    /// A non-RAG answer backend.
    Backend,
}

impl Stage {
    /// Stable identifier used in logs and API payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Retrieval => "retrieval",
            Self::Synthesis => "synthesis",
            Self::Deadline => "deadline",
            Self::Backend => "backend",
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answer produced from the knowledge base.
    Grounded,
    /// The index returned nothing relevant.
    NoKnowledge,
    /// The request carried no usable question.
    EmptyQuestion,
    /// A fatal stage failed and a fallback answer was returned.
    Degraded {
        /// Stage that failed.
        stage: Stage,
        /// Failure classification.
        kind: FailureKind,
    },
}

impl Outcome {
    /// Machine-readable error code for degraded outcomes, e.g. `embedding_timeout`.
    pub fn error_code(&self) -> Option<String> {
        match self {
            Self::Degraded { stage, kind } => Some(format!("{}_{}", stage.as_str(), kind.as_str())),
            _ => None,
        }
    }
}

/// The externally visible artifact of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// Answer text (or a user-facing fallback message).
    pub answer: String,
    /// Distinct passage titles in first-seen order.
    pub sources: Vec<String>,
    /// Up to three suggested next questions.
    pub followups: Vec<String>,
    /// Conversation identifier echoed back to the caller.
    pub conversation_id: Option<String>,
    /// How the run ended.
    pub outcome: Outcome,
}

impl PipelineResult {
    /// Grounded answer with its sources and suggestions.
    pub fn grounded(answer: String, sources: Vec<String>, followups: Vec<String>) -> Self {
        Self {
            answer,
            sources,
            followups,
            conversation_id: None,
            outcome: Outcome::Grounded,
        }
    }

    /// Fixed answer without sources for a non-grounded outcome.
    pub fn fallback(answer: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            followups: Vec::new(),
            conversation_id: None,
            outcome,
        }
    }

    /// Attach the caller's conversation identifier.
    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Whether the answer is backed by retrieved passages.
    pub fn is_grounded(&self) -> bool {
        self.outcome == Outcome::Grounded
    }
}

/// Fatal stage failures, converted to fallback answers at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Query embedding failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] UpstreamError),
    /// Vector index lookup failed.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] UpstreamError),
    /// Answer generation failed.
    #[error("{0}")]
    Synthesis(#[source] UpstreamError),
    /// The whole run exceeded the configured deadline.
    #[error("pipeline exceeded its {}s deadline", .0.as_secs())]
    Deadline(Duration),
}

impl PipelineError {
    /// Stage that produced the failure.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Embedding(_) => Stage::Embedding,
            Self::Retrieval(_) => Stage::Retrieval,
            Self::Synthesis(_) => Stage::Synthesis,
            Self::Deadline(_) => Stage::Deadline,
        }
    }

    /// Failure classification.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Embedding(error) | Self::Retrieval(error) | Self::Synthesis(error) => {
                error.kind()
            }
            Self::Deadline(_) => FailureKind::Timeout,
        }
    }
}

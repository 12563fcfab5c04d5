//! Retrieval-augmented answer pipeline: contextualization, retrieval, synthesis, follow-ups.

pub mod citations;
pub mod contextualize;
pub mod followups;
mod mappers;
pub mod prompts;
mod service;
pub mod synthesize;
pub mod types;

pub use crate::upstream::FailureKind;
pub use service::{
    DEADLINE_ANSWER, EMPTY_QUESTION_ANSWER, NO_KNOWLEDGE_ANSWER, PipelineSettings, RagPipeline,
    RETRIEVAL_UNAVAILABLE_ANSWER,
};
pub use types::{
    ChatInput, ConversationTurn, Outcome, PipelineError, PipelineResult, Role, Stage,
    latest_question,
};

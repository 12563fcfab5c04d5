#![deny(missing_docs)]

//! Core library for the R&D consultant service.

/// HTTP routing and REST handlers.
pub mod api;
/// Answer backends sharing one question-to-answer contract.
pub mod backend;
/// Benchmark question set and response scoring.
pub mod benchmark;
/// Chat completion client shared by the generation stages.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Answer traffic counters.
pub mod metrics;
/// Retrieval-augmented answer pipeline.
pub mod pipeline;
/// Timeouts and error taxonomy for outbound HTTP calls.
pub mod upstream;
/// Pinecone vector index integration.
pub mod vector;

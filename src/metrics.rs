use std::sync::atomic::{AtomicU64, Ordering};

use crate::pipeline::{FailureKind, Outcome};

/// Thread-safe counters describing answer traffic.
#[derive(Default)]
pub struct AnswerMetrics {
    requests: AtomicU64,
    grounded: AtomicU64,
    no_knowledge: AtomicU64,
    empty_questions: AtomicU64,
    degraded: AtomicU64,
    timeouts: AtomicU64,
    contextualizer_fallbacks: AtomicU64,
    followup_failures: AtomicU64,
}

impl AnswerMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the terminal outcome of one answer request.
    pub fn record_outcome(&self, outcome: &Outcome) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Grounded => &self.grounded,
            Outcome::NoKnowledge => &self.no_knowledge,
            Outcome::EmptyQuestion => &self.empty_questions,
            Outcome::Degraded { kind, .. } => {
                if *kind == FailureKind::Timeout {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                &self.degraded
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a contextualization that fell back to the raw question.
    pub fn record_contextualizer_fallback(&self) {
        self.contextualizer_fallbacks
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a follow-up generation that produced nothing because of a failure.
    pub fn record_followup_failure(&self) {
        self.followup_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            grounded: self.grounded.load(Ordering::Relaxed),
            no_knowledge: self.no_knowledge.load(Ordering::Relaxed),
            empty_questions: self.empty_questions.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            contextualizer_fallbacks: self.contextualizer_fallbacks.load(Ordering::Relaxed),
            followup_failures: self.followup_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of answer counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Requests answered since startup.
    pub requests: u64,
    /// Answers grounded in retrieved passages.
    pub grounded: u64,
    /// Requests that found no relevant passages.
    pub no_knowledge: u64,
    /// Requests without a usable question.
    pub empty_questions: u64,
    /// Requests answered with a degraded fallback.
    pub degraded: u64,
    /// Degraded requests caused by an upstream timeout.
    pub timeouts: u64,
    /// Contextualizations that fell back to the raw question.
    pub contextualizer_fallbacks: u64,
    /// Follow-up generations that failed.
    pub followup_failures: u64,
}

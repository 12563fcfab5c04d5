//! Fixed question set and scoring for end-to-end answer quality checks.
//!
//! In-domain questions are scored on presence of an answer, attached sources, answer length,
//! and expected keyword stems. Out-of-domain questions score only when the service admits it
//! has no information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Local development server.
pub const LOCAL_ENDPOINT: &str = "http://localhost:3005";
/// Production deployment.
pub const PRODUCTION_ENDPOINT: &str = "https://rd-consultant-ionplato.onrender.com";

/// Lowercase phrases accepted as an honest "no information" reply.
pub const NO_INFO_PHRASES: &[&str] = &[
    "нет информации",
    "не нашёл",
    "не могу ответить",
    "контексте нет",
];

/// One benchmark question.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BenchmarkQuestion {
    /// Stable question number.
    pub id: u32,
    /// Question text sent as `message`.
    pub question: &'static str,
    /// Category used for the breakdown.
    pub category: &'static str,
    /// Keyword stems expected in a good answer.
    pub expected_keywords: &'static [&'static str],
    /// Whether the question is outside the knowledge base.
    pub out_of_domain: bool,
}

const fn in_domain(
    id: u32,
    question: &'static str,
    category: &'static str,
    expected_keywords: &'static [&'static str],
) -> BenchmarkQuestion {
    BenchmarkQuestion {
        id,
        question,
        category,
        expected_keywords,
        out_of_domain: false,
    }
}

const fn out_of_domain(id: u32, question: &'static str) -> BenchmarkQuestion {
    BenchmarkQuestion {
        id,
        question,
        category: "irrelevant",
        expected_keywords: &[],
        out_of_domain: true,
    }
}

/// The full question set.
pub const QUESTIONS: &[BenchmarkQuestion] = &[
    in_domain(1, "Какие налоговые льготы существуют для НИОКР в России?", "tax_benefits", &["налог", "льгот", "вычет", "НИОКР"]),
    in_domain(2, "Как рассчитывается налоговый вычет на НИОКР?", "tax_calculation", &["расчет", "вычет", "коэффициент"]),
    in_domain(3, "Какие расходы можно включить в налоговый вычет по НИОКР?", "tax_expenses", &["расход", "затрат", "включ"]),
    in_domain(4, "Какие документы необходимы для подтверждения НИОКР?", "documentation", &["документ", "подтвержд", "оформ"]),
    in_domain(5, "Что такое техническое задание на НИОКР?", "technical_spec", &["техническ", "задан", "ТЗ"]),
    in_domain(6, "Как правильно оформить отчет о выполнении НИОКР?", "reporting", &["отчет", "оформ", "выполнен"]),
    in_domain(7, "Как учитываются расходы на НИОКР в бухгалтерском учете?", "accounting", &["учет", "расход", "бухгалтер"]),
    in_domain(8, "Что такое НМА и как они связаны с НИОКР?", "intangible_assets", &["НМА", "нематериальн", "актив"]),
    in_domain(9, "Какие есть особенности амортизации результатов НИОКР?", "amortization", &["амортизац", "списан", "срок"]),
    in_domain(10, "Какие гранты доступны для финансирования НИОКР?", "grants", &["грант", "субсиди", "финансиров"]),
    in_domain(11, "Что такое фонд МИК и как получить поддержку?", "mik_fund", &["МИК", "фонд", "поддержк"]),
    in_domain(12, "Как оформить патент на результат НИОКР?", "patents", &["патент", "оформ", "результат"]),
    in_domain(13, "Что такое интеллектуальная собственность в контексте НИОКР?", "ip", &["интеллектуальн", "собственност", "ИС"]),
    in_domain(14, "Какие критерии определяют, является ли работа НИОКР?", "criteria", &["критери", "определ", "признак"]),
    in_domain(15, "Чем отличается НИОКР от обычной разработки?", "distinction", &["отлич", "разработк", "научн"]),
    in_domain(16, "Какие риски существуют при проведении НИОКР?", "risks", &["риск", "неопределенност", "неудач"]),
    in_domain(17, "Какие этапы включает проект НИОКР?", "stages", &["этап", "стади", "фаз"]),
    in_domain(18, "Какие требования к персоналу для выполнения НИОКР?", "personnel", &["персонал", "сотрудник", "квалификац"]),
    out_of_domain(19, "Какая погода будет завтра?"),
    out_of_domain(20, "Как приготовить борщ?"),
];

/// What the service returned for one question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSample {
    /// Whether an HTTP 200 response was received.
    pub success: bool,
    /// Answer text (empty on failure).
    pub answer: String,
    /// Source titles attached to the answer.
    pub sources: Vec<String>,
    /// Wall-clock time of the request in seconds.
    pub response_time: f64,
    /// Transport or status error, if any.
    pub error: Option<String>,
}

/// Score breakdown for one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Answer text is non-empty.
    pub has_answer: bool,
    /// At least one source was attached.
    pub has_sources: bool,
    /// Answer length in characters.
    pub answer_length: usize,
    /// Number of attached sources.
    pub source_count: usize,
    /// Number of expected keyword stems present in the answer.
    pub keywords_found: usize,
    /// Overall score, 0 to 100.
    pub quality_score: u32,
    /// For out-of-domain questions, whether the answer admitted having no information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_honest_no_answer: Option<bool>,
}

/// Score one response against its question.
pub fn evaluate(question: &BenchmarkQuestion, sample: &ResponseSample) -> Evaluation {
    let answer = sample.answer.to_lowercase();
    let mut evaluation = Evaluation {
        has_answer: !sample.answer.is_empty(),
        has_sources: !sample.sources.is_empty(),
        answer_length: sample.answer.chars().count(),
        source_count: sample.sources.len(),
        keywords_found: 0,
        quality_score: 0,
        is_honest_no_answer: None,
    };

    if question.out_of_domain {
        let honest = NO_INFO_PHRASES.iter().any(|phrase| answer.contains(phrase));
        evaluation.is_honest_no_answer = Some(honest);
        evaluation.quality_score = if honest { 100 } else { 0 };
        return evaluation;
    }

    evaluation.keywords_found = question
        .expected_keywords
        .iter()
        .filter(|keyword| answer.contains(&keyword.to_lowercase()))
        .count();

    let mut score = 0;
    if evaluation.has_answer {
        score += 30;
    }
    if evaluation.has_sources {
        score += 20;
    }
    score += match evaluation.answer_length {
        length if length > 200 => 20,
        length if length > 100 => 10,
        _ => 0,
    };
    if !question.expected_keywords.is_empty() {
        score += (evaluation.keywords_found * 30 / question.expected_keywords.len()) as u32;
    }
    evaluation.quality_score = score;
    evaluation
}

/// Question, response, and score of one benchmark step.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    /// Question asked.
    pub question: BenchmarkQuestion,
    /// Response received.
    pub result: ResponseSample,
    /// Score breakdown.
    pub evaluation: Evaluation,
}

/// Mean score across records; zero for an empty run.
pub fn average_score(records: &[BenchmarkRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: u32 = records
        .iter()
        .map(|record| record.evaluation.quality_score)
        .sum();
    f64::from(total) / records.len() as f64
}

/// Mean score and question count per category, sorted by category name.
pub fn category_averages(records: &[BenchmarkRecord]) -> BTreeMap<&'static str, (f64, usize)> {
    let mut grouped: BTreeMap<&'static str, Vec<u32>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.question.category)
            .or_default()
            .push(record.evaluation.quality_score);
    }
    grouped
        .into_iter()
        .map(|(category, scores)| {
            let mean = f64::from(scores.iter().sum::<u32>()) / scores.len() as f64;
            (category, (mean, scores.len()))
        })
        .collect()
}

/// Overall benchmark outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Average score of at least 70.
    Passed,
    /// Average score from 40 up to 70.
    Marginal,
    /// Average score below 40.
    Failed,
}

impl Verdict {
    /// Classify an average score.
    pub fn from_score(average: f64) -> Self {
        if average >= 70.0 {
            Self::Passed
        } else if average >= 40.0 {
            Self::Marginal
        } else {
            Self::Failed
        }
    }

    /// Process exit code for the verdict.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Marginal => 1,
            Self::Failed => 2,
        }
    }

    /// Status marker used in reports.
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Passed => "✅",
            Self::Marginal => "⚠️",
            Self::Failed => "❌",
        }
    }
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    sources: Vec<String>,
}

/// Send one question to `POST {endpoint}/api/chat`; failures are captured in the sample.
pub async fn ask(
    client: &reqwest::Client,
    endpoint: &str,
    question: &BenchmarkQuestion,
    timeout: Duration,
) -> ResponseSample {
    let started = Instant::now();
    let response = client
        .post(format!("{}/api/chat", endpoint.trim_end_matches('/')))
        .timeout(timeout)
        .json(&serde_json::json!({ "message": question.question }))
        .send()
        .await;

    let outcome = match response {
        Ok(response) if response.status().is_success() => response
            .json::<ChatReply>()
            .await
            .map_err(|error| error.to_string()),
        Ok(response) => Err(format!("HTTP {}", response.status().as_u16())),
        Err(error) => Err(error.to_string()),
    };
    let response_time = started.elapsed().as_secs_f64();

    match outcome {
        Ok(reply) => ResponseSample {
            success: true,
            answer: reply.answer,
            sources: reply.sources,
            response_time,
            error: None,
        },
        Err(error) => {
            tracing::warn!(id = question.id, error = %error, "Benchmark request failed");
            ResponseSample {
                response_time,
                error: Some(error),
                ..ResponseSample::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn sample(answer: &str, sources: &[&str]) -> ResponseSample {
        ResponseSample {
            success: true,
            answer: answer.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            response_time: 1.0,
            error: None,
        }
    }

    #[test]
    fn question_set_shape() {
        assert_eq!(QUESTIONS.len(), 20);
        let out_of_domain: Vec<_> = QUESTIONS.iter().filter(|q| q.out_of_domain).collect();
        assert_eq!(out_of_domain.len(), 2);
        assert!(out_of_domain.iter().all(|q| q.expected_keywords.is_empty()));
    }

    #[test]
    fn full_marks_for_long_sourced_answer_with_all_keywords() {
        let answer = format!(
            "Налоговые льготы на НИОКР включают вычет расходов с коэффициентом. {}",
            "Подробности. ".repeat(20)
        );
        let evaluation = evaluate(&QUESTIONS[0], &sample(&answer, &["НК РФ"]));
        assert_eq!(evaluation.keywords_found, 4);
        assert_eq!(evaluation.quality_score, 100);
    }

    #[test]
    fn partial_keywords_scale_and_truncate() {
        // 1 of 3 keywords: 30 / 3 = 10; 2 of 3 would give 20.
        let evaluation = evaluate(&QUESTIONS[1], &sample("Вычет есть.", &[]));
        assert_eq!(evaluation.keywords_found, 1);
        assert_eq!(evaluation.quality_score, 30 + 10);
    }

    #[test]
    fn medium_length_earns_half_length_points() {
        let evaluation = evaluate(&QUESTIONS[16], &sample(&"а".repeat(150), &["Источник"]));
        assert_eq!(evaluation.answer_length, 150);
        assert_eq!(evaluation.quality_score, 30 + 20 + 10);
    }

    #[test]
    fn out_of_domain_requires_honest_refusal() {
        let weather = &QUESTIONS[18];
        let honest = evaluate(
            weather,
            &sample(
                "К сожалению, я не нашёл релевантной информации в базе знаний.",
                &[],
            ),
        );
        assert_eq!(honest.quality_score, 100);
        assert_eq!(honest.is_honest_no_answer, Some(true));

        let invented = evaluate(weather, &sample("Завтра солнечно, +20.", &["Погода"]));
        assert_eq!(invented.quality_score, 0);
    }

    #[test]
    fn verdict_thresholds() {
        assert_eq!(Verdict::from_score(70.0).exit_code(), 0);
        assert_eq!(Verdict::from_score(69.9).exit_code(), 1);
        assert_eq!(Verdict::from_score(40.0), Verdict::Marginal);
        assert_eq!(Verdict::from_score(12.5).exit_code(), 2);
    }

    #[test]
    fn categories_average_their_scores() {
        let record = |index: usize, score: u32| BenchmarkRecord {
            question: QUESTIONS[index],
            result: ResponseSample::default(),
            evaluation: Evaluation {
                has_answer: true,
                has_sources: false,
                answer_length: 0,
                source_count: 0,
                keywords_found: 0,
                quality_score: score,
                is_honest_no_answer: None,
            },
        };
        let records = vec![record(18, 100), record(19, 0), record(0, 80)];

        let categories = category_averages(&records);

        assert_eq!(categories["irrelevant"], (50.0, 2));
        assert_eq!(categories["tax_benefits"], (80.0, 1));
        assert_eq!(average_score(&records), 60.0);
    }

    #[tokio::test]
    async fn ask_posts_message_and_reads_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body(json!({ "message": QUESTIONS[0].question }));
                then.status(200).json_body(json!({
                    "answer": "Есть вычет [Источник 1].",
                    "sources": ["НК РФ"],
                    "followups": []
                }));
            })
            .await;

        let sample = ask(
            &reqwest::Client::new(),
            &server.base_url(),
            &QUESTIONS[0],
            Duration::from_secs(5),
        )
        .await;

        mock.assert_async().await;
        assert!(sample.success);
        assert_eq!(sample.sources, vec!["НК РФ"]);
    }

    #[tokio::test]
    async fn ask_records_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500);
            })
            .await;

        let sample = ask(
            &reqwest::Client::new(),
            &server.base_url(),
            &QUESTIONS[0],
            Duration::from_secs(5),
        )
        .await;

        assert!(!sample.success);
        assert_eq!(sample.error.as_deref(), Some("HTTP 500"));
        assert!(sample.answer.is_empty());
    }
}

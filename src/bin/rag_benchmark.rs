use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rdconsult::benchmark::{
    BenchmarkRecord, LOCAL_ENDPOINT, PRODUCTION_ENDPOINT, QUESTIONS, Verdict, ask,
    average_score, category_averages, evaluate,
};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PREVIEW_CHARS: usize = 150;

#[derive(Clone, Copy, ValueEnum)]
enum Endpoint {
    Local,
    Production,
}

impl Endpoint {
    const fn url(self) -> &'static str {
        match self {
            Self::Local => LOCAL_ENDPOINT,
            Self::Production => PRODUCTION_ENDPOINT,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "rag-benchmark",
    about = "Ask the fixed question set against a running server and score the answers"
)]
struct Cli {
    #[arg(long, value_enum, default_value = "local")]
    endpoint: Endpoint,
    /// Overrides `--endpoint` with an explicit base URL.
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct CategoryScore {
    avg_score: f64,
    count: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    timestamp: String,
    endpoint: &'a str,
    total_questions: usize,
    avg_quality_score: f64,
    avg_response_time: f64,
    success_rate: f64,
    category_scores: BTreeMap<&'static str, CategoryScore>,
    results: &'a [BenchmarkRecord],
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(verdict) => std::process::exit(verdict.exit_code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

async fn run() -> Result<Verdict> {
    let cli = Cli::parse();
    let endpoint = cli
        .url
        .unwrap_or_else(|| cli.endpoint.url().to_string());
    let output = cli.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "benchmark_results_{}.json",
            OffsetDateTime::now_utc().unix_timestamp()
        ))
    });

    let client = reqwest::Client::builder()
        .user_agent(concat!("rag-benchmark/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    println!("Benchmark against {endpoint} ({} questions)\n", QUESTIONS.len());

    let mut records = Vec::with_capacity(QUESTIONS.len());
    for question in QUESTIONS {
        println!("[{}/{}] {}", question.id, QUESTIONS.len(), question.question);
        let result = ask(&client, &endpoint, question, REQUEST_TIMEOUT).await;
        let evaluation = evaluate(question, &result);

        if result.success {
            println!(
                "  score {}/100, {:.2}s, {} sources, {} chars",
                evaluation.quality_score,
                result.response_time,
                evaluation.source_count,
                evaluation.answer_length
            );
            println!("  {}", preview(&result.answer));
        } else {
            println!(
                "  failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();

        records.push(BenchmarkRecord {
            question: *question,
            result,
            evaluation,
        });
    }

    let average = average_score(&records);
    let verdict = Verdict::from_score(average);
    let report = build_report(&endpoint, &records, average);
    print_summary(&report, verdict);

    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    write_string(&output, &json)?;
    println!("\nResults written to {}", output.display());

    Ok(verdict)
}

fn build_report<'a>(endpoint: &'a str, records: &'a [BenchmarkRecord], average: f64) -> Report<'a> {
    let succeeded: Vec<_> = records.iter().filter(|r| r.result.success).collect();
    let avg_response_time = if succeeded.is_empty() {
        0.0
    } else {
        succeeded.iter().map(|r| r.result.response_time).sum::<f64>() / succeeded.len() as f64
    };
    let success_rate = if records.is_empty() {
        0.0
    } else {
        succeeded.len() as f64 / records.len() as f64 * 100.0
    };

    Report {
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        endpoint,
        total_questions: records.len(),
        avg_quality_score: average,
        avg_response_time,
        success_rate,
        category_scores: category_averages(records)
            .into_iter()
            .map(|(category, (avg_score, count))| (category, CategoryScore { avg_score, count }))
            .collect(),
        results: records,
    }
}

fn print_summary(report: &Report<'_>, verdict: Verdict) {
    println!("Summary");
    println!("  average score:         {:.1}/100", report.avg_quality_score);
    println!("  average response time: {:.2}s", report.avg_response_time);
    println!("  success rate:          {:.0}%", report.success_rate);
    println!("\nBy category");
    for (category, score) in &report.category_scores {
        println!("  {category:<20} {:>5.1} ({})", score.avg_score, score.count);
    }
    println!(
        "\n{} overall {:.1}/100",
        verdict.marker(),
        report.avg_quality_score
    );
}

fn preview(answer: &str) -> String {
    if answer.chars().count() <= PREVIEW_CHARS {
        return answer.to_string();
    }
    let head: String = answer.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directories for {}",
                parent.display()
            )
        })?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create file at {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write data to {}", path.display()))?;
    Ok(())
}

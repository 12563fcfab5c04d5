use std::{sync::Arc, time::Duration};

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use httpmock::{Method::POST, MockServer};
use rdconsult::{
    api::create_router,
    backend::AnswerBackend,
    chat::{ChatSettings, OpenAiChatClient},
    embedding::{EmbeddingSettings, OpenAiEmbeddingClient},
    pipeline::{NO_KNOWLEDGE_ANSWER, Outcome, PipelineSettings, RagPipeline, prompts::PromptSet},
    vector::{PineconeIndex, PineconeSettings},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const QUESTION: &str = "Какие налоговые льготы есть для НИОКР?";

fn pipeline_against(server: &MockServer) -> RagPipeline {
    let http = reqwest::Client::builder()
        .user_agent("rdconsult-integration")
        .build()
        .expect("http client");
    let timeout = Duration::from_secs(5);

    let embedder = OpenAiEmbeddingClient::with_client(
        http.clone(),
        EmbeddingSettings {
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "text-embedding-3-small".into(),
            dimension: 3,
            timeout,
        },
    );
    let retriever = PineconeIndex::with_client(
        http.clone(),
        PineconeSettings {
            index_host: server.base_url(),
            api_key: "pc-test".into(),
            top_k: 5,
            timeout,
        },
    );
    let chat = OpenAiChatClient::with_client(
        http,
        ChatSettings {
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            timeout,
        },
    );

    RagPipeline::new(
        Arc::new(embedder),
        Arc::new(retriever),
        Arc::new(chat),
        Arc::new(PromptSet::default()),
        PipelineSettings::default(),
    )
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

async fn mock_embeddings(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .json_body(json!({ "model": "text-embedding-3-small", "input": QUESTION }));
            then.status(200)
                .json_body(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] }));
        })
        .await;
}

#[tokio::test]
async fn grounded_answer_flows_through_every_stage() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    let query = server
        .mock_async(|when, then| {
            when.method(POST).path("/query").header("api-key", "pc-test");
            then.status(200).json_body(json!({
                "matches": [
                    {
                        "id": "7#0",
                        "score": 0.93,
                        "metadata": {
                            "title": "Налоговый вычет",
                            "text": "Расходы на НИОКР учитываются с коэффициентом 1,5.",
                            "source_id": 7,
                            "chunk_index": 0
                        }
                    },
                    {
                        "id": "7#1",
                        "score": 0.88,
                        "metadata": {
                            "title": "Налоговый вычет",
                            "text": "Перечень НИОКР утверждён постановлением Правительства.",
                            "source_id": 7,
                            "chunk_index": 1
                        }
                    }
                ]
            }));
        })
        .await;
    let synthesis = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("[Источник 1: Налоговый вычет]");
            then.status(200).json_body(completion(
                "Расходы учитываются с коэффициентом 1,5 [Источник 1]. См. также [Источник 9].",
            ));
        })
        .await;
    let followups = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("json_object");
            then.status(200).json_body(completion(
                r#"{"questions": ["Какие документы нужны?", "Как подать декларацию?"]}"#,
            ));
        })
        .await;

    let pipeline = pipeline_against(&server);
    let result = pipeline
        .answer(QUESTION.into(), Some("conv-7".into()))
        .await;

    query.assert_async().await;
    synthesis.assert_async().await;
    followups.assert_async().await;
    assert_eq!(result.outcome, Outcome::Grounded);
    assert_eq!(
        result.answer,
        "Расходы учитываются с коэффициентом 1,5 [Источник 1]. См. также."
    );
    assert_eq!(result.sources, vec!["Налоговый вычет"]);
    assert_eq!(
        result.followups,
        vec!["Какие документы нужны?", "Как подать декларацию?"]
    );
    assert_eq!(result.conversation_id.as_deref(), Some("conv-7"));
    assert_eq!(pipeline.metrics_snapshot().grounded, 1);
}

#[tokio::test]
async fn empty_index_returns_no_knowledge_without_generation() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(200).json_body(json!({ "matches": [] }));
        })
        .await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("unused"));
        })
        .await;

    let result = pipeline_against(&server).answer(QUESTION.into(), None).await;

    assert_eq!(chat.hits_async().await, 0);
    assert_eq!(result.answer, NO_KNOWLEDGE_ANSWER);
    assert_eq!(result.outcome, Outcome::NoKnowledge);
    assert!(result.sources.is_empty());
    assert!(result.followups.is_empty());
}

#[tokio::test]
async fn index_outage_surfaces_error_code_over_http() {
    let server = MockServer::start_async().await;
    mock_embeddings(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(503).body("unavailable");
        })
        .await;

    let backend: Arc<dyn AnswerBackend> = Arc::new(pipeline_against(&server));
    let response = create_router(backend.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "message": QUESTION }).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(payload["error"], "retrieval_service_error");
    assert!(payload.get("sources").is_none());
    assert_eq!(backend.metrics_snapshot().degraded, 1);
}

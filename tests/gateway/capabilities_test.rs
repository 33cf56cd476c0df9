//! Typed operations layered over the generic call.

mod support;

use std::time::Duration;

use inference_gateway::gateway::{
    Anomaly, Classification, SearchHit, Sentiment, SentimentLabel,
};
use inference_gateway::worker::{CallKind, GatewayError, OptionOverrides};
use serde_json::{json, Value};
use support::{FakeWorker, Harness};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Answer every call with `null` and report `(kind, operation)` for each.
fn record_calls(mut worker: FakeWorker) -> mpsc::UnboundedReceiver<(CallKind, String)> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(call) = worker.next_call().await {
            let operation = call
                .context
                .as_ref()
                .and_then(|context| context.get("operation"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let _ = tx.send((call.kind, operation));
            worker.respond(&call.id, Value::Null).await;
        }
    });
    rx
}

#[tokio::test]
async fn test_summarize_text() {
    let (harness, mut worker) = Harness::start().await;
    let capabilities = harness.gateway.capabilities();

    let (summary, _) = tokio::join!(capabilities.summarize_text("A long article.", 20), async {
        let call = worker.next_call().await.unwrap();
        assert_eq!(call.kind, CallKind::Summarize);
        assert!(call.prompt.contains("A long article."));
        assert_eq!(
            call.context,
            Some(json!({
                "operation": "summarize_text",
                "text": "A long article.",
                "maxWords": 20
            }))
        );
        worker.respond(&call.id, json!("Short.")).await;
    });

    assert_eq!(summary.unwrap(), "Short.");
}

#[tokio::test]
async fn test_typed_payloads() {
    let (harness, mut worker) = Harness::start().await;
    let capabilities = harness.gateway.capabilities();

    let (hits, _) = tokio::join!(capabilities.search("rust", Some(json!({"lang": "en"}))), async {
        let call = worker.next_call().await.unwrap();
        assert_eq!(call.prompt, "rust");
        assert_eq!(call.context.as_ref().unwrap()["filters"], json!({"lang": "en"}));
        worker
            .respond(&call.id, json!([{"id": "1", "title": "The Book", "score": 0.9}]))
            .await;
    });
    let hits = hits.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0],
        SearchHit {
            id: "1".to_string(),
            title: "The Book".to_string(),
            snippet: String::new(),
            score: 0.9,
            metadata: None,
        }
    );

    let (sentiment, _) = tokio::join!(capabilities.analyze_sentiment("great!"), async {
        let call = worker.next_call().await.unwrap();
        worker
            .respond(&call.id, json!({"label": "positive", "score": 0.8}))
            .await;
    });
    let sentiment = sentiment.unwrap();
    assert_eq!(sentiment.label, SentimentLabel::Positive);
    assert_eq!(sentiment.score, 0.8);

    let (anomalies, _) = tokio::join!(capabilities.detect_anomalies(&[1.0, 1.1, 9.0]), async {
        let call = worker.next_call().await.unwrap();
        assert_eq!(call.context.as_ref().unwrap()["series"], json!([1.0, 1.1, 9.0]));
        worker
            .respond(&call.id, json!([{"index": 2, "value": 9.0, "reason": "spike"}]))
            .await;
    });
    assert_eq!(
        anomalies.unwrap(),
        vec![Anomaly {
            index: 2,
            value: 9.0,
            reason: Some("spike".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_absent_payload_yields_defaults() {
    let (harness, worker) = Harness::start().await;
    let _calls = record_calls(worker);
    let capabilities = harness.gateway.capabilities();

    assert!(capabilities.search("q", None).await.unwrap().is_empty());
    assert!(capabilities.get_recommendations("books", 5).await.unwrap().is_empty());
    assert_eq!(capabilities.generate_content("cats", "poem").await.unwrap(), "");
    assert_eq!(capabilities.analyze_sentiment("meh").await.unwrap(), Sentiment::default());
    assert_eq!(capabilities.translate_text("hola", "en", Some("es")).await.unwrap(), "");
    assert_eq!(
        capabilities.classify_content("text", &["a", "b"]).await.unwrap(),
        Classification {
            category: None,
            confidence: 0.0,
        }
    );
    assert!(capabilities.detect_anomalies(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_payload_field_yields_default() {
    let (harness, mut worker) = Harness::start().await;

    let caps = harness.gateway.capabilities();
    let (keywords, _) = tokio::join!(
        caps.extract_keywords("text", 3),
        async {
            let call = worker.next_call().await.unwrap();
            worker.respond_empty(&call.id).await;
        }
    );
    assert!(keywords.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_operation_uses_its_kind() {
    let (harness, worker) = Harness::start().await;
    let mut calls = record_calls(worker);
    let capabilities = harness.gateway.capabilities();

    capabilities.search("q", None).await.unwrap();
    capabilities.get_recommendations("s", 3).await.unwrap();
    capabilities.generate_content("t", "blog post").await.unwrap();
    capabilities.analyze_sentiment("t").await.unwrap();
    capabilities.summarize_text("t", 10).await.unwrap();
    capabilities.translate_text("t", "fr", None).await.unwrap();
    capabilities.describe_image("https://example.com/cat.png").await.unwrap();
    capabilities.extract_keywords("t", 5).await.unwrap();
    capabilities.classify_content("t", &["x"]).await.unwrap();
    capabilities.generate_questions("t", 2).await.unwrap();
    capabilities.answer_question("why?", "because").await.unwrap();
    capabilities.generate_greeting("Sam", "morning").await.unwrap();
    capabilities.suggest_activities("bored", None).await.unwrap();
    capabilities
        .generate_health_insights(&json!({"steps": 4000}))
        .await
        .unwrap();
    capabilities.detect_anomalies(&[1.0]).await.unwrap();
    capabilities.generate_code("add two numbers", "rust").await.unwrap();
    capabilities.optimize_content("text", "clarity").await.unwrap();

    let mut seen = Vec::new();
    while let Ok(entry) = calls.try_recv() {
        seen.push(entry);
    }

    let expected = [
        (CallKind::Search, "search"),
        (CallKind::Recommend, "get_recommendations"),
        (CallKind::Generate, "generate_content"),
        (CallKind::Analyze, "analyze_sentiment"),
        (CallKind::Summarize, "summarize_text"),
        (CallKind::Translate, "translate_text"),
        (CallKind::Analyze, "describe_image"),
        (CallKind::Analyze, "extract_keywords"),
        (CallKind::Analyze, "classify_content"),
        (CallKind::Generate, "generate_questions"),
        (CallKind::Generate, "answer_question"),
        (CallKind::Generate, "generate_greeting"),
        (CallKind::Recommend, "suggest_activities"),
        (CallKind::Analyze, "generate_health_insights"),
        (CallKind::Analyze, "detect_anomalies"),
        (CallKind::Generate, "generate_code"),
        (CallKind::Generate, "optimize_content"),
    ];
    let expected: Vec<(CallKind, String)> = expected
        .iter()
        .map(|(kind, operation)| (*kind, operation.to_string()))
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_option_overrides() {
    let (harness, mut worker) = Harness::start().await;
    let capabilities = harness
        .gateway
        .capabilities()
        .with_options(OptionOverrides::default().max_tokens(64).top_p(0.5));

    let (_, options) = tokio::join!(capabilities.generate_code("fizzbuzz", "python"), async {
        let call = worker.next_call().await.unwrap();
        worker.respond(&call.id, json!("print(1)")).await;
        call.options.unwrap()
    });

    assert_eq!(options.max_tokens, 64);
    assert_eq!(options.top_p, 0.5);
    assert_eq!(options.temperature, 0.7);
    assert_eq!(options.model, "default");
}

#[tokio::test]
async fn test_worker_error_names_operation() {
    let (harness, mut worker) = Harness::start().await;

    let caps = harness.gateway.capabilities();
    let (result, _) = tokio::join!(
        caps.translate_text("hi", "tlh", None),
        async {
            let call = worker.next_call().await.unwrap();
            worker.fail(&call.id, "unsupported language").await;
        }
    );

    let err = result.unwrap_err();
    assert_eq!(err.operation, "translate_text");
    assert!(matches!(
        &err.source,
        GatewayError::CallFailed { message, .. } if message == "unsupported language"
    ));
    assert!(err.to_string().contains("unsupported language"));
}

#[tokio::test]
async fn test_wrong_payload_shape() {
    let (harness, mut worker) = Harness::start().await;

    let caps = harness.gateway.capabilities();
    let (result, _) = tokio::join!(
        caps.generate_questions("text", 3),
        async {
            let call = worker.next_call().await.unwrap();
            worker.respond(&call.id, json!({"questions": "not a list"})).await;
        }
    );

    let err = result.unwrap_err();
    assert_eq!(err.operation, "generate_questions");
    assert!(matches!(err.source, GatewayError::InvalidPayload(_)));
}

#[tokio::test]
async fn test_not_ready_is_wrapped() {
    let (harness, _worker) = Harness::start().await;
    harness.gateway.shutdown().await;

    let err = harness
        .gateway
        .capabilities()
        .describe_image("https://example.com/a.png")
        .await
        .unwrap_err();
    assert_eq!(err.operation, "describe_image");
    assert!(matches!(err.source, GatewayError::NotReady(_)));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_through_capabilities() {
    let (harness, mut worker) = Harness::start().await;

    let caps = harness
        .gateway
        .capabilities()
        .with_deadline(Duration::from_secs(3));
    let (result, _) = tokio::join!(
        caps.answer_question("q?", "ctx"),
        async { worker.next_call().await.unwrap() }
    );

    let err = result.unwrap_err();
    assert_eq!(err.operation, "answer_question");
    assert!(matches!(err.source, GatewayError::Timeout(d) if d == Duration::from_secs(3)));
    assert_eq!(harness.gateway.pending_count(), 0);
}

#[tokio::test]
async fn test_cancellation_through_capabilities() {
    let (harness, mut worker) = Harness::start().await;
    let token = CancellationToken::new();

    let caps = harness
        .gateway
        .capabilities()
        .with_cancellation(token.clone());
    let (result, _) = tokio::join!(
        caps.generate_greeting("Ada", "evening"),
        async {
            worker.next_call().await.unwrap();
            token.cancel();
        }
    );

    let err = result.unwrap_err();
    assert!(matches!(err.source, GatewayError::Cancelled));
    assert_eq!(harness.gateway.pending_count(), 0);
}

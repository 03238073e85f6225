#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Wire-level tests for the Ollama clients against a mock HTTP server

use std::time::Duration;

use askdocs::RagError;
use askdocs::config::{Config, OllamaConfig};
use askdocs::embeddings::{Embedder, OllamaEmbedder};
use askdocs::generation::{Generator, OllamaGenerator};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let address = server.address();
    Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: address.ip().to_string(),
            port: address.port(),
            embedding_model: "test-embed".to_string(),
            generation_model: "test-gen".to_string(),
            batch_size: 2,
            embedding_dimension: 4,
            generation_timeout_seconds: 5,
        },
        ..Config::default()
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
async fn embed_batch_splits_requests_and_preserves_order() {
    init_test_tracing();
    let server = MockServer::start().await;

    // batch_size is 2, so three texts arrive as two requests.
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({
            "model": "test-embed",
            "input": ["first", "second"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({
            "model": "test-embed",
            "input": ["third"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 0.0, 1.0, 0.0]],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    let texts = vec![
        "first".to_string(),
        "second".to_string(),
        "third".to_string(),
    ];
    let vectors = embedder
        .embed_batch(&texts)
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(vectors[2], vec![0.0, 0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn empty_text_is_rejected_before_any_request() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    let err = embedder
        .embed("   \n\t  ")
        .await
        .expect_err("whitespace-only text must be rejected");

    assert!(
        err.to_string().contains("empty text"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn unexpected_vector_width_is_rejected() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]],
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    let err = embedder
        .embed("hello")
        .await
        .expect_err("a 2-wide vector must be rejected when 4 is configured");

    assert!(err.to_string().contains("expected 4"), "unexpected error: {err}");
}

#[tokio::test]
async fn response_count_mismatch_is_rejected() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0, 0.0]],
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    let texts = vec!["one".to_string(), "two".to_string()];
    let err = embedder
        .embed_batch(&texts)
        .await
        .expect_err("one vector for two texts must be rejected");

    assert!(err.to_string().contains("Mismatch"), "unexpected error: {err}");
}

#[tokio::test]
async fn http_failures_surface_as_embedding_errors() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    let err = embedder
        .embed("hello")
        .await
        .expect_err("server errors must fail the call");

    assert!(matches!(err, RagError::Embedding(_)));
    assert!(err.to_string().contains("500"), "unexpected error: {err}");
}

#[tokio::test]
async fn generation_returns_the_model_reply() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "test-gen",
            "prompt": "Say hi.",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Hello there.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(&config_for(&server)).expect("client should build");
    let reply = generator
        .generate("Say hi.")
        .await
        .expect("generation should succeed");

    assert_eq!(reply, "Hello there.");
}

#[tokio::test]
async fn generation_timeout_maps_to_its_own_error() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "too late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(&config_for(&server))
        .expect("client should build")
        .with_timeout(Duration::from_millis(200));
    let err = generator
        .generate("Say hi.")
        .await
        .expect_err("a stalled server must time the call out");

    assert!(
        matches!(err, RagError::GenerationTimeout(_)),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn model_validation_reads_the_tag_list() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed"}, {"name": "some-other-model"}],
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);

    let embedder = OllamaEmbedder::new(&config).expect("client should build");
    embedder
        .validate_model()
        .expect("the embedding model is in the tag list");

    let generator = OllamaGenerator::new(&config).expect("client should build");
    let err = generator
        .validate_model()
        .expect_err("the generation model is missing from the tag list");
    assert!(
        err.to_string().contains("not available"),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_pings_and_validates() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed"}, {"name": "test-gen"}],
        })))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("client should build");
    embedder.health_check().expect("health check should pass");
}

use super::*;
use crate::config::OllamaConfig;

fn test_config() -> Config {
    Config {
        ollama: OllamaConfig {
            generation_model: "test-gen-model".to_string(),
            generation_timeout_seconds: 45,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

#[test]
fn client_configuration() {
    let client = OllamaGenerator::new(&test_config()).expect("Failed to create client");

    assert_eq!(client.model, "test-gen-model");
    assert_eq!(client.model(), "test-gen-model");
    assert_eq!(client.timeout, Duration::from_secs(45));
    assert_eq!(client.base_url.port(), Some(11434));
}

#[test]
fn default_timeout_applies() {
    let client = OllamaGenerator::new(&Config::default()).expect("Failed to create client");
    assert_eq!(
        client.timeout,
        Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECONDS)
    );
}

#[test]
fn with_timeout_overrides_configured_deadline() {
    let client = OllamaGenerator::new(&test_config())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(5));

    assert_eq!(client.timeout, Duration::from_secs(5));
}

#[test]
fn request_serialization_disables_streaming() {
    let request = GenerateRequest {
        model: "m".to_string(),
        prompt: "p".to_string(),
        stream: false,
    };

    let json = serde_json::to_string(&request).expect("serializable");
    assert!(json.contains("\"stream\":false"));
}

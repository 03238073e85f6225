use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config::load(TempDir::new().expect("should create TempDir").path())
        .expect("loading from an empty dir should yield defaults");

    assert!(config.validate().is_ok());
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.prompt.max_history_turns, 10);
    assert_eq!(config.ollama.generation_model, "llama3:latest");
}

#[test]
fn config_file_round_trip() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let mut original = Config::load(temp_dir.path()).expect("should load defaults");
    original.ollama.host = "test-host".to_string();
    original.ollama.port = 8080;
    original.retrieval.top_k = 3;
    original.chunking.chunk_size = 500;
    original.chunking.overlap = 50;

    original.save().expect("should save config");

    let loaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(original, loaded);
    assert_eq!(loaded.ollama.host, "test-host");
    assert_eq!(loaded.retrieval.top_k, 3);
}

#[test]
fn partial_config_uses_section_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let toml_content = r#"
        [ollama]
        host = "custom-host"
    "#;
    fs::write(temp_dir.path().join("config.toml"), toml_content)
        .expect("should write config file");

    let config = Config::load(temp_dir.path()).expect("should load partial config");
    assert_eq!(config.ollama.host, "custom-host");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.chunking.chunk_size, 1000);
}

#[test]
fn invalid_toml_handling() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let invalid_toml = r#"
        [ollama
        host = "localhost"
        port = "invalid_port"
    "#;
    fs::write(temp_dir.path().join("config.toml"), invalid_toml)
        .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn overlap_must_be_smaller_than_chunk_size() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");

    config.chunking.chunk_size = 200;
    config.chunking.overlap = 200;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(200, 200))
    ));

    config.chunking.overlap = 300;
    assert!(config.validate().is_err());

    config.chunking.overlap = 199;
    assert!(config.validate().is_ok());
}

#[test]
fn zero_chunk_size_rejected() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");

    config.chunking.chunk_size = 0;
    config.chunking.overlap = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkSize(0))
    ));
}

#[test]
fn top_k_boundary_validation() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");

    config.retrieval.top_k = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    config.retrieval.top_k = 101;
    assert!(config.validate().is_err());

    config.retrieval.top_k = 100;
    assert!(config.validate().is_ok());
}

#[test]
fn port_boundary_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_port(1).is_ok());
    assert!(config.set_port(65535).is_ok());
    assert!(config.set_port(0).is_err());
}

#[test]
fn batch_size_boundary_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_batch_size(1).is_ok());
    assert!(config.set_batch_size(1000).is_ok());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
}

#[test]
fn model_name_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_embedding_model("valid-model".to_string()).is_ok());
    assert!(config.set_generation_model("another_model".to_string()).is_ok());
    assert!(config.set_embedding_model(String::new()).is_err());
    assert!(config.set_generation_model("   ".to_string()).is_err());
}

#[test]
fn generation_timeout_validation() {
    let mut config = OllamaConfig::default();

    config.generation_timeout_seconds = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidGenerationTimeout(0))
    ));

    config.generation_timeout_seconds = 3601;
    assert!(config.validate().is_err());

    config.generation_timeout_seconds = 120;
    assert!(config.validate().is_ok());
    assert_eq!(
        config.generation_timeout(),
        std::time::Duration::from_secs(120)
    );
}

#[test]
fn ollama_url_generation_with_different_hosts() {
    let cases = vec![
        ("http", "localhost", 11434, "http://localhost:11434/"),
        ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
        ("https", "secure.example.com", 443, "https://secure.example.com/"),
    ];

    for (protocol, host, port, expected_url) in cases {
        let config = OllamaConfig {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            ..OllamaConfig::default()
        };

        let url = config.ollama_url().expect("ollama_url is ok");
        assert_eq!(url.as_str(), expected_url);
    }
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidProtocol("ftp".to_string()),
        ConfigError::InvalidPort(0),
        ConfigError::InvalidBatchSize(0),
        ConfigError::InvalidModel(String::new()),
        ConfigError::OverlapTooLarge(1000, 1000),
        ConfigError::InvalidTopK(0),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(!message.is_empty());
        assert!(message.len() > 10);
    }
}

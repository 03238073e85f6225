use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::RagError;
use crate::chunking::{SourceDocument, source_of_chunk_id};
use crate::config::{Config, get_config_dir};
use crate::embeddings::OllamaEmbedder;
use crate::engine::{AnswerResult, RagEngine};
use crate::generation::OllamaGenerator;
use crate::index::{LanceIndex, VectorIndex};
use crate::indexer::{IngestReport, ReconcileStrategy, SkippedDocument};
use crate::prompt::ConversationTurn;

/// File types the loader treats as plain-text documents.
const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

async fn load_engine() -> Result<(Config, RagEngine)> {
    let config_dir = get_config_dir().context("Failed to locate configuration directory")?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;
    let engine = RagEngine::from_config(&config)
        .await
        .context("Failed to initialize the engine")?;
    Ok((config, engine))
}

/// Load the plain-text documents directly under `directory`.
///
/// Files that cannot be read or are not a supported type are recorded
/// as skipped rather than failing the load; a missing directory is
/// fatal. Documents come back sorted by file name so repeated runs see
/// the same order.
#[inline]
pub async fn load_documents(
    directory: &Path,
) -> Result<(Vec<SourceDocument>, Vec<SkippedDocument>)> {
    let mut reader = fs::read_dir(directory)
        .await
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?
    {
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Failed to inspect {}", entry.path().display()))?;
        if file_type.is_dir() {
            debug!("Skipping subdirectory {}", entry.path().display());
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let source_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            });
        if !supported {
            debug!("Skipping {source_id}: unsupported file type");
            skipped.push(SkippedDocument {
                source_id,
                reason: "unsupported file type".to_string(),
            });
            continue;
        }

        match fs::read_to_string(&path).await {
            Ok(text) => documents.push(SourceDocument::new(source_id, text)),
            Err(e) => {
                let reason = RagError::Load(e.to_string()).to_string();
                warn!("Skipping {source_id}: {reason}");
                skipped.push(SkippedDocument { source_id, reason });
            }
        }
    }

    Ok((documents, skipped))
}

/// Ingest the documents under `directory` into the vector index.
#[inline]
pub async fn ingest_directory(directory: &Path, incremental: bool) -> Result<()> {
    info!("Ingesting documents from {}", directory.display());
    let (_config, engine) = load_engine().await?;

    println!("📂 Loading documents from {}", directory.display());
    let (documents, unreadable) = load_documents(directory).await?;

    if documents.is_empty() && unreadable.is_empty() {
        println!("No documents found in {}", directory.display());
        println!(
            "Supported file types: {}",
            SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .join(", ")
        );
        return Ok(());
    }
    println!("   Found {} documents", documents.len());

    let strategy = if incremental {
        ReconcileStrategy::Incremental
    } else {
        ReconcileStrategy::FullRebuild
    };

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Running {strategy} ingestion..."));
    bar.enable_steady_tick(Duration::from_millis(120));

    let outcome = engine.ingest(&documents, strategy).await;
    bar.finish_and_clear();
    let report = outcome.context("Ingestion failed")?;

    print_ingest_report(&report, &unreadable);

    match engine.verify_consistency(&documents).await {
        Ok(check) if check.is_consistent => println!("✅ {}", check.summary()),
        Ok(check) => println!("⚠️  {}", check.summary()),
        Err(e) => warn!("Consistency check after ingestion failed: {e}"),
    }

    Ok(())
}

fn print_ingest_report(report: &IngestReport, unreadable: &[SkippedDocument]) {
    println!();
    println!("Ingestion completed ({} strategy)", report.strategy);
    println!("  Documents indexed: {}", report.documents_indexed);
    println!("  Chunks indexed: {}", report.chunks_indexed);
    println!("  Documents removed: {}", report.documents_removed);
    println!("  Duration: {:?}", report.duration);

    let skipped_total = report.skipped.len() + unreadable.len();
    if skipped_total > 0 {
        println!("  ⚠️  Skipped: {skipped_total}");
        for skip in unreadable.iter().chain(&report.skipped) {
            println!("     - {}: {}", skip.source_id, skip.reason);
        }
    }
}

/// Answer a single question from the indexed documents.
#[inline]
pub async fn ask(question: &str) -> Result<()> {
    let (_config, engine) = load_engine().await?;

    let question = question.trim();
    if question.is_empty() {
        println!("Please provide a question.");
        return Ok(());
    }

    let result = engine
        .answer(question, &[])
        .await
        .context("Failed to answer the question")?;

    println!();
    println!("{}", result.text);
    print_sources(&result);

    Ok(())
}

/// Interactive session that carries conversation history between
/// questions.
#[inline]
pub async fn chat() -> Result<()> {
    let (config, engine) = load_engine().await?;

    println!("💬 Ask questions about your documents. Type 'exit' to quit.");
    println!(
        "   The last {} conversation turns are carried into each answer.",
        config.prompt.max_history_turns
    );
    println!();

    let mut history: Vec<ConversationTurn> = Vec::new();

    loop {
        let line: String = match Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            // Terminal closed or interrupted
            Err(_) => break,
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.answer(question, &history).await {
            Ok(result) => {
                println!();
                println!("{}", result.text);
                print_sources(&result);
                println!();

                history.push(ConversationTurn::user(question));
                history.push(ConversationTurn::assistant(result.text));
            }
            Err(e) => {
                error!("Failed to answer: {e}");
                println!("❌ {e}");
                println!("   The exchange was not added to the history.");
            }
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn print_sources(result: &AnswerResult) {
    if result.grounded && !result.sources.is_empty() {
        println!();
        println!("📄 Sources: {}", result.sources.iter().join(", "));
    }
}

/// Show connectivity and index statistics.
#[inline]
pub async fn show_status() -> Result<()> {
    let config_dir = get_config_dir().context("Failed to locate configuration directory")?;
    let config = match Config::load(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Configuration could not be loaded: {e}");
            println!("   Run 'askdocs config' to repair it.");
            return Ok(());
        }
    };

    println!("📊 askdocs Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaEmbedder::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {e}");
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {e}");
        }
    }
    match OllamaGenerator::new(&config) {
        Ok(client) => match client.validate_model() {
            Ok(()) => {
                println!("   📝 Generation Model: {}", config.ollama.generation_model);
            }
            Err(e) => {
                println!("   ⚠️  Generation model unavailable - {e}");
            }
        },
        Err(e) => {
            println!("   ❌ Generator: Failed to configure - {e}");
        }
    }

    println!();
    println!("🔍 Vector Index Status:");
    match LanceIndex::new(&config).await {
        Ok(index) => {
            println!("   ✅ LanceDB: Connected");

            match index.validate_integrity().await {
                Ok(true) => println!("   ✅ Integrity check passed"),
                Ok(false) => println!("   ⚠️  Integrity check failed"),
                Err(e) => println!("   ⚠️  Integrity check error - {e}"),
            }

            match index.list_ids().await {
                Ok(ids) => {
                    let documents: BTreeSet<&str> = ids
                        .iter()
                        .filter_map(|id| source_of_chunk_id(id))
                        .collect();
                    println!("   📄 Stored Chunks: {}", ids.len());
                    println!("   📚 Documents: {}", documents.len());
                    for source in &documents {
                        println!("      - {source}");
                    }
                }
                Err(e) => {
                    println!("   ⚠️  Could not list index contents - {e}");
                }
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {e}");
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'askdocs ingest <directory>' to index your documents");
    println!("   • Use 'askdocs ask \"<question>\"' for a single answer");
    println!("   • Use 'askdocs chat' for an interactive session");

    Ok(())
}

use std::path::PathBuf;

use askdocs::Result;
use askdocs::commands::{ask, chat, ingest_directory, show_status};
use askdocs::config::{run_interactive_config, show_config};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "askdocs")]
#[command(about = "A retrieval-augmented question answering system for local documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the documents in a directory
    Ingest {
        /// Directory containing .txt and .md documents
        directory: PathBuf,
        /// Only reconcile changes instead of rebuilding the whole index
        #[arg(long)]
        incremental: bool,
    },
    /// Ask a single question about the indexed documents
    Ask {
        /// The question to answer
        question: String,
    },
    /// Start an interactive question answering session
    Chat,
    /// Show connectivity and index statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest {
            directory,
            incremental,
        } => {
            ingest_directory(&directory, incremental).await?;
        }
        Commands::Ask { question } => {
            ask(&question).await?;
        }
        Commands::Chat => {
            chat().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["askdocs", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
        }
    }

    #[test]
    fn ingest_command_with_directory() {
        let cli = Cli::try_parse_from(["askdocs", "ingest", "./docs"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                directory,
                incremental,
            } = parsed.command
            {
                assert_eq!(directory, PathBuf::from("./docs"));
                assert!(!incremental);
            }
        }
    }

    #[test]
    fn ingest_command_with_incremental_flag() {
        let cli = Cli::try_parse_from(["askdocs", "ingest", "./docs", "--incremental"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { incremental, .. } = parsed.command {
                assert!(incremental);
            }
        }
    }

    #[test]
    fn ask_command_with_question() {
        let cli = Cli::try_parse_from(["askdocs", "ask", "What is chunking?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question } = parsed.command {
                assert_eq!(question, "What is chunking?");
            }
        }
    }

    #[test]
    fn ask_command_requires_a_question() {
        let cli = Cli::try_parse_from(["askdocs", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["askdocs", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["askdocs", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["askdocs", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}

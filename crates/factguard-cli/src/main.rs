//! factguard command-line entry point.
//!
//! Prints guarded records as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use factguard_core::{book_card, fact_card, Outcome, Transcript};
use factguard_runtime::{ChatSession, Guardrail, ProviderRegistry, RuntimeConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_CHAT_PERSONA: &str =
    "You're a helpful AI assistant and a Python expert. Please answer clearly and objectively.";

#[derive(Parser)]
#[command(name = "factguard")]
#[command(about = "Schema-guarded LLM generation with a trust policy")]
#[command(version)]
struct Cli {
    /// Runtime configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured provider type
    #[arg(long)]
    provider: Option<String>,

    /// Override the configured model
    #[arg(long)]
    model: Option<String>,

    /// Print the full outcome envelope instead of the bare record
    #[arg(long)]
    envelope: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a verifiable fact card
    Fact {
        /// The question or topic
        query: String,
    },

    /// Generate a fictitious book card
    Book {
        /// Theme for the book
        theme: String,
    },

    /// Free-form chat; each message is sent in order with prior context
    Chat {
        /// Messages to send
        #[arg(required = true)]
        messages: Vec<String>,

        /// System persona
        #[arg(long, default_value = DEFAULT_CHAT_PERSONA)]
        system: String,
    },

    /// Print a built-in schema as JSON Schema
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Fact,
    Book,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        config: config_path,
        provider,
        model,
        envelope,
        command,
    } = Cli::parse();

    let command = match command {
        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Fact => fact_card(),
                SchemaKind::Book => book_card(),
            };
            println!("{}", serde_json::to_string_pretty(&schema.json_schema())?);
            return Ok(());
        }
        other => other,
    };

    let registry = ProviderRegistry::with_defaults();
    let config = load_config(config_path.as_deref(), provider, model, &registry)?;
    let backend = config
        .build_provider(&registry)
        .with_context(|| format!("cannot create provider '{}'", config.provider))?;

    tracing::info!(provider = %config.provider, model = %config.model, "factguard starting");

    match command {
        Commands::Fact { query } => {
            let outcome = Guardrail::fact_card(backend, &config).evaluate(&query).await;
            print_outcome(&outcome, envelope)?;
        }

        Commands::Book { theme } => {
            let outcome = Guardrail::book_card(backend, &config).evaluate(&theme).await;
            print_outcome(&outcome, envelope)?;
        }

        Commands::Chat { messages, system } => {
            let session = ChatSession::new(backend, &config);
            let mut transcript = Transcript::with_system(system);

            for message in messages {
                println!("User: {}", message);
                match session.send(&mut transcript, &message).await {
                    Ok(reply) => println!("Assistant: {}\n", reply),
                    Err(e) => println!("Error connecting to API: {}\n", e),
                }
            }
        }

        Commands::Schema { .. } => {}
    }

    Ok(())
}

fn load_config(
    path: Option<&Path>,
    provider: Option<String>,
    model: Option<String>,
    registry: &ProviderRegistry,
) -> anyhow::Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("cannot load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    match (provider, model) {
        (Some(provider), model) => config.select_provider(provider, model, registry),
        (None, Some(model)) => config.model = model,
        (None, None) => {}
    }

    config.validate()?;
    Ok(config)
}

fn print_outcome(outcome: &Outcome, envelope: bool) -> anyhow::Result<()> {
    let rendered = if envelope {
        serde_json::to_string_pretty(outcome)?
    } else {
        serde_json::to_string_pretty(&outcome.to_payload())?
    };
    println!("{}", rendered);
    Ok(())
}

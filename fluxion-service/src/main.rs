//! fluxion
//!
//! Ask questions about the approved articles database in plain language.
//!
//! Composition root: loads the environment, builds the provider, the
//! Operation Catalog, the read-only query sandbox and one [`Agent`], then
//! answers a single `--ask` question or runs an interactive session.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;

use fluxion_chat::{Agent, ProgressEmitter, ProgressEvent, TextToSql};
use fluxion_core::config::{get_config_opt, load_environment};
use fluxion_core::AppConfig;
use fluxion_llm::{create_provider, BoxedProvider, ProviderType};
use fluxion_sql::{Database, QuerySandbox, ReadOnlyDatabase, SandboxLimits};
use fluxion_tools::{register_article_tools, OperationCatalog};

mod repl;

use repl::Mode;

#[derive(Parser, Debug)]
#[command(name = "fluxion")]
#[command(about = "Ask questions about the approved articles database")]
struct Args {
    /// Model backend (ollama, openai); overrides LLM_PROVIDER
    #[arg(long)]
    provider: Option<String>,

    /// Model name; overrides LLM_MODEL
    #[arg(long)]
    model: Option<String>,

    /// SQLite file; overrides PATH_TO_DATABASE and NAME_DB
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Schema reference for generated queries; overrides SQL_SCHEMA_PATH
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Stream replies (no tool use)
    #[arg(long, conflicts_with = "direct_sql")]
    stream: bool,

    /// Answer every question with a generated query
    #[arg(long)]
    direct_sql: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Answer one question and exit
    #[arg(long)]
    ask: Option<String>,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.stream {
            Mode::Stream
        } else if self.direct_sql {
            Mode::DirectSql
        } else {
            Mode::Tools
        }
    }

    /// Flag value for a config key, if the matching flag was given
    fn override_for(&self, key: &str) -> Option<String> {
        let path_str = |p: &Path| p.to_string_lossy().into_owned();
        match key {
            "LLM_PROVIDER" => self.provider.clone(),
            "LLM_MODEL" => self.model.clone(),
            "SQL_SCHEMA_PATH" => self.schema.as_deref().map(path_str),
            "PATH_TO_DATABASE" => self.db_path.as_ref().map(|p| {
                p.parent()
                    .map(path_str)
                    .filter(|dir| !dir.is_empty())
                    .unwrap_or_else(|| ".".to_string())
            }),
            "NAME_DB" => self
                .db_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    fn resolve_config(&self) -> Result<AppConfig> {
        let config =
            AppConfig::from_lookup(|key| self.override_for(key).or_else(|| get_config_opt(key)))?;
        Ok(config)
    }
}

fn init_tracing<W>(json: bool, writer: W) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("fluxion=info".parse()?)
        .add_directive("fluxion_core=info".parse()?)
        .add_directive("fluxion_chat=info".parse()?)
        .add_directive("fluxion_tools=info".parse()?)
        .add_directive("fluxion_sql=info".parse()?)
        .add_directive("fluxion_llm=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

/// Install logging, then read the environment file so its messages are kept.
fn bootstrap<W>(json: bool, writer: W) -> Result<Option<String>>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    init_tracing(json, writer)?;
    Ok(load_environment())
}

fn build_provider(config: &AppConfig) -> Result<BoxedProvider> {
    let provider_type: ProviderType = config
        .llm_provider
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let (api_key, base_url) = match provider_type {
        ProviderType::Ollama => (config.ollama_api_key.clone(), config.ollama_base_url.clone()),
        ProviderType::OpenAI => (
            config.openai_api_key.clone(),
            Some(config.openai_base_url.clone()),
        ),
    };
    create_provider(provider_type, config.llm_model.clone(), api_key, base_url)
}

fn print_progress(event: ProgressEvent) {
    eprintln!("  · [{}] {}", event.stage, event.message);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    bootstrap(args.log_json, std::io::stderr)?;

    let config = args.resolve_config().context("Invalid configuration")?;
    info!("Using database {}", config.database_file().display());

    let provider = build_provider(&config)?;

    // --- Operation Catalog ---
    let catalog = Arc::new(OperationCatalog::new());
    register_article_tools(&catalog, Arc::new(Database::from_config(&config))).await;
    info!("Registered {} operation(s)", catalog.len().await);

    // --- Query sandbox + text-to-SQL fallback ---
    let sandbox = QuerySandbox::new(
        Arc::new(ReadOnlyDatabase::from_config(&config)),
        SandboxLimits::from_config(&config),
    );
    let text_to_sql = TextToSql::new(
        Arc::clone(&provider),
        Arc::new(sandbox),
        config.schema_path.clone(),
    );
    if !config.schema_path.exists() {
        warn!(
            "Schema reference {} is missing; generated queries will be refused",
            config.schema_path.display()
        );
    }

    let mut agent = Agent::new(provider, catalog, Some(text_to_sql))
        .await
        .with_progress(ProgressEmitter::new(print_progress));

    let mode = args.mode();
    match args.ask {
        Some(question) => repl::answer_once(&mut agent, mode, &question).await,
        None => repl::run(&mut agent, mode).await,
    }
}

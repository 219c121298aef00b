//! `process_query` entry point: loads configuration, wires concrete
//! adapters for each external collaborator, runs the pipeline once, and
//! prints the resulting `QAOutcome` as JSON.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use websearch_qa_common::{SearchProvider, SystemConfig};
use websearch_qa_core::crawler::{HeadlessCrawler, PageCrawler};
use websearch_qa_core::llm::{LlmClient, ReqwestLlmClient};
use websearch_qa_core::web_search::{GoogleSearchClient, TavilySearchClient, WebSearchProvider};
use websearch_qa_core::Pipeline;
use websearch_qa_storage::{QdrantSessionStore, SessionStore};

#[derive(Parser)]
#[command(name = "websearch-qa")]
#[command(about = "Answers a question by searching the web, ingesting pages, and retrieving grounded context")]
struct Cli {
    /// The question to answer.
    query: String,

    /// Session identifier; prior chunks ingested under the same id are
    /// loaded before the pipeline runs and the run's chunks are saved
    /// back under it afterwards.
    #[arg(long, default_value = "default")]
    session_id: String,

    /// Path to a TOML configuration file; see `SystemConfig`.
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let cli = Cli::parse();
    let config = SystemConfig::load(&cli.config)?;

    let llm: Arc<dyn LlmClient> = Arc::new(ReqwestLlmClient::new(
        config.llm_model.clone(),
        config.embedding_model.clone(),
        config.vllm_base_url.clone(),
        config.embedding_base_url.clone(),
    )?);

    let web_search: Arc<dyn WebSearchProvider> = match config.search_provider {
        SearchProvider::Tavily => Arc::new(TavilySearchClient::new(config.tavily_api_key.clone())?),
        SearchProvider::Google => Arc::new(GoogleSearchClient::new(
            config.google_api_key.clone(),
            config.google_cx.clone(),
        )),
    };

    let crawler: Arc<dyn PageCrawler> = Arc::new(HeadlessCrawler::new());
    let session_store: Arc<dyn SessionStore> = Arc::new(QdrantSessionStore::new(
        &config.qdrant_host,
        config.qdrant_port,
        config.vector_dimension,
    )?);

    let pipeline = Pipeline::new(config, llm, web_search, crawler, session_store);
    let outcome = pipeline.process_query(&cli.query, &cli.session_id).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

// src/main.rs
// CLI entry point: loads configuration, wires storage/embedding/LLM
// providers, and serves the MCP tool surface over stdio.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use reasoningbank::confidence::{ConfidenceEngine, InMemorySignalStore};
use reasoningbank::distiller::Distiller;
use reasoningbank::embedder::fake::FakeEmbedder;
use reasoningbank::embedder::http::HttpEmbedder;
use reasoningbank::embedder::Embedder;
use reasoningbank::llm::fake::FakeLLMClient;
use reasoningbank::llm::http::HttpLLMClient;
use reasoningbank::llm::LLMClient;
use reasoningbank::mcp::ReasoningBankServer;
use reasoningbank::rollup::RollupWorker;
use reasoningbank::scheduler::ConsolidationScheduler;
use reasoningbank::service::Service;
use reasoningbank::store::memory::InMemoryStoreProvider;
use reasoningbank::store::qdrant::QdrantStoreProvider;
use reasoningbank::store::StoreProvider;
use reasoningbank::ReasoningBankConfig;

/// Cross-session memory engine for AI agents, served as an MCP tool.
#[derive(Parser, Debug)]
#[command(name = "reasoningbank", version, about)]
struct Cli {
    /// Tenant identity all collections are scoped under.
    #[arg(long, env = "RBANK_TENANT", default_value = "default")]
    tenant: String,

    /// Qdrant URL, e.g. http://localhost:6334. Falls back to an in-memory
    /// store when unset.
    #[arg(long, env = "RBANK_QDRANT_URL")]
    qdrant_url: Option<String>,

    /// OpenAI-compatible embeddings endpoint base URL.
    #[arg(long, env = "RBANK_EMBEDDING_URL")]
    embedding_url: Option<String>,

    #[arg(long, env = "RBANK_EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    #[arg(long, env = "RBANK_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// OpenAI-compatible chat-completions endpoint used for consolidation merges.
    #[arg(long, env = "RBANK_LLM_URL")]
    llm_url: Option<String>,

    #[arg(long, env = "RBANK_LLM_API_KEY")]
    llm_api_key: Option<String>,

    #[arg(long, env = "RBANK_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Projects the background consolidation scheduler sweeps on its interval.
    #[arg(long, env = "RBANK_SCHEDULED_PROJECTS", value_delimiter = ',')]
    scheduled_projects: Vec<String>,

    /// Disables the background consolidation scheduler entirely.
    #[arg(long, env = "RBANK_DISABLE_SCHEDULER", default_value_t = false)]
    disable_scheduler: bool,
}

/// Set `RBANK_DISABLE_LLM=1` to force heuristic-only operation (no
/// embeddings, no consolidation merges) even if endpoint env vars are set.
fn disabled_by_env() -> bool {
    std::env::var("RBANK_DISABLE_LLM").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn build_embedder(cli: &Cli, dimensions: usize) -> Arc<dyn Embedder> {
    if disabled_by_env() {
        info!("RBANK_DISABLE_LLM set, using fake embedder");
        return Arc::new(FakeEmbedder::new(dimensions));
    }
    match &cli.embedding_url {
        Some(url) => {
            info!(url, model = %cli.embedding_model, "using HTTP embedding provider");
            Arc::new(HttpEmbedder::new(url.clone(), cli.embedding_api_key.clone(), cli.embedding_model.clone(), dimensions))
        }
        None => {
            warn!("no embedding endpoint configured, falling back to fake embedder (search quality will be poor)");
            Arc::new(FakeEmbedder::new(dimensions))
        }
    }
}

fn build_llm_client(cli: &Cli) -> Option<Arc<dyn LLMClient>> {
    if disabled_by_env() {
        info!("RBANK_DISABLE_LLM set, consolidation merges disabled");
        return None;
    }
    match &cli.llm_url {
        Some(url) => {
            info!(url, model = %cli.llm_model, "using HTTP LLM provider for consolidation");
            Some(Arc::new(HttpLLMClient::new(url.clone(), cli.llm_api_key.clone(), cli.llm_model.clone())))
        }
        None => {
            warn!("no LLM endpoint configured, consolidation will skip every cluster");
            None
        }
    }
}

async fn build_store_provider(cli: &Cli) -> anyhow::Result<Arc<dyn StoreProvider>> {
    match &cli.qdrant_url {
        Some(url) => {
            info!(url, "connecting to Qdrant");
            Ok(Arc::new(QdrantStoreProvider::connect(url)?))
        }
        None => {
            warn!("no Qdrant URL configured, using in-memory store (data will not persist across restarts)");
            Ok(Arc::new(InMemoryStoreProvider::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ReasoningBankConfig::default();

    let store_provider = build_store_provider(&cli).await?;
    let embedder = build_embedder(&cli, config.embedding_dimension as usize);
    let llm = build_llm_client(&cli);

    let signal_store = Arc::new(InMemorySignalStore::new());
    let confidence_engine = Arc::new(ConfidenceEngine::new(
        signal_store,
        config.signal_rollup_cutoff_days,
        config.weight_learning_window_hours,
    ));

    let service = Arc::new(Service::new(
        cli.tenant.clone(),
        store_provider,
        Some(embedder),
        Some(confidence_engine.clone()),
        config.clone(),
    )?);

    let distiller = Arc::new(Distiller::new(service.clone(), llm, config.clone()));

    if cli.disable_scheduler || cli.scheduled_projects.is_empty() {
        info!("consolidation scheduler not started (disabled or no projects configured)");
    } else {
        let scheduler = Arc::new(
            ConsolidationScheduler::new(distiller.clone(), &config)
                .with_interval(Duration::from_secs(3600 * config.consolidation_window_hours.max(1) as u64))
                .with_project_ids(cli.scheduled_projects.clone()),
        );
        scheduler.start()?;
        info!(projects = ?cli.scheduled_projects, "consolidation scheduler started");

        let rollup_worker = RollupWorker::new(
            service.clone(),
            confidence_engine,
            cli.scheduled_projects.clone(),
            Duration::from_secs(3600 * 6),
        );
        rollup_worker.spawn();
        info!("signal rollup worker started");
    }

    let server = ReasoningBankServer::new(service, distiller);

    info!("reasoningbank MCP server starting on stdio");
    let transport = rmcp::transport::io::stdio();
    let running = rmcp::serve_server(server, transport).await?;
    running.waiting().await?;

    Ok(())
}

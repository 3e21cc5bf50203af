use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::SemanticError;
use crate::collection::CollectionLoader;
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::mcp::collection_server;
use crate::registry::CollectionRegistry;
use crate::search::SearchService;
use crate::sync::{GitPuller, RELOADED_STATUS, ReloadReport, SYNCED_STATUS, SyncController};

/// Everything a command needs, built once from the configuration
pub struct Services {
    pub config: Config,
    pub registry: Arc<CollectionRegistry>,
    pub loader: CollectionLoader,
    pub search: Arc<SearchService>,
    pub controller: Arc<SyncController>,
}

impl Services {
    /// Wire the services to the configured Ollama server and Git checkout
    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
        Ok(Self::with_embedder(config, Arc::new(ollama)))
    }

    /// Wire the services to an arbitrary embedder
    #[inline]
    pub fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        let registry = Arc::new(CollectionRegistry::new());
        let loader = CollectionLoader::new(Arc::clone(&embedder));
        let puller = GitPuller::new(
            config.sync.program.clone(),
            config.sync.args.clone(),
            config.data_dir(),
        );
        let controller = Arc::new(SyncController::new(
            Arc::clone(&registry),
            loader.clone(),
            config.collection_sources(),
            Arc::new(puller),
        ));
        let search = Arc::new(SearchService::new(
            Arc::clone(&registry),
            embedder,
            config.source.default_top_k,
        ));

        Self {
            config,
            registry,
            loader,
            search,
            controller,
        }
    }

    /// Load and publish a single configured collection
    #[inline]
    pub fn load_collection(&self, name: &str) -> crate::Result<()> {
        let source = self
            .controller
            .sources()
            .iter()
            .find(|source| source.name == name)
            .ok_or_else(|| SemanticError::CollectionNotFound(name.to_string()))?;

        let collection = self.loader.load_source(source)?;
        self.registry.publish(collection);
        Ok(())
    }
}

fn load_services(config_dir: &Path) -> Result<Services> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    Services::from_config(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_failures(report: &ReloadReport) {
    for (name, message) in report.failures() {
        error!("Collection '{}' is unavailable: {}", name, message);
    }
}

/// Search one collection and print the ranked records
#[inline]
pub fn search(config_dir: &Path, collection: &str, query: &str, top_k: Option<usize>) -> Result<()> {
    let services = load_services(config_dir)?;
    services.load_collection(collection)?;

    let top_k = top_k.unwrap_or(services.config.source.default_top_k);
    let results = services.search.search(collection, query, top_k)?;

    print_json(&results)
}

/// Print every record of one collection
#[inline]
pub fn list_records(config_dir: &Path, collection: &str) -> Result<()> {
    let services = load_services(config_dir)?;
    services.load_collection(collection)?;

    print_json(&services.search.list_all(collection)?)
}

/// Load every collection and print the per-collection outcome
#[inline]
pub fn reload(config_dir: &Path) -> Result<()> {
    let services = load_services(config_dir)?;
    let report = services.controller.reload();
    log_failures(&report);

    print_json(&json!({
        "status": RELOADED_STATUS,
        "collections": report,
    }))
}

/// Pull the data directory, then load every collection
#[inline]
pub fn sync(config_dir: &Path) -> Result<()> {
    let services = load_services(config_dir)?;

    match services.controller.sync() {
        Ok(report) => {
            log_failures(&report);
            print_json(&json!({
                "status": SYNCED_STATUS,
                "collections": report,
            }))
        }
        Err(e) => {
            print_json(&json!({ "error": e.to_string() }))?;
            Err(e.into())
        }
    }
}

/// Show embedding-server health and a load summary for every collection
#[inline]
pub fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📊 Semantic DB Status Report").bold().cyan());
    eprintln!("{}", "=".repeat(50));
    eprintln!();

    eprintln!("{}", style("🤖 Ollama Status:").bold().yellow());
    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    match ollama.health_check() {
        Ok(()) => {
            eprintln!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            eprintln!("   📋 Model: {}", config.ollama.model);
            eprintln!("   🔢 Batch Size: {}", config.ollama.batch_size);
        }
        Err(e) => {
            eprintln!("   ❌ Ollama: {:#}", e);
            eprintln!();
            eprintln!("Collections can't be loaded without an embedding model.");
            eprintln!("Use 'semantic-db config' to update connection settings.");
            return Ok(());
        }
    }

    eprintln!();
    eprintln!("{}", style("📚 Collections:").bold().yellow());
    let services = Services::with_embedder(config, Arc::new(ollama));
    let report = services.controller.reload();

    for summary in services.registry.summaries() {
        eprintln!(
            "   ✅ {}: {} records, {} skipped, {} dimensions, loaded {}",
            style(&summary.name).green(),
            summary.records,
            summary.skipped,
            summary
                .dimension
                .map_or_else(|| "no".to_string(), |d| d.to_string()),
            summary.loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    for (name, message) in report.failures() {
        eprintln!("   ❌ {}: {}", style(name).red(), message);
    }

    eprintln!();
    eprintln!("💡 Quick Actions:");
    eprintln!("   • Use 'semantic-db search <collection> <query>' to try a query");
    eprintln!("   • Use 'semantic-db sync' to pull the latest sources");
    eprintln!("   • Use 'semantic-db serve' to start the MCP server for AI assistants");

    Ok(())
}

/// Load every collection, then serve MCP on stdio until EOF or Ctrl-C
#[inline]
pub async fn serve_mcp(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;

    let health = {
        let ollama = ollama.clone();
        tokio::task::spawn_blocking(move || ollama.health_check()).await?
    };
    match health {
        Ok(()) => info!(
            "✅ Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => warn!("⚠️  Ollama is not ready, collections may fail to load: {:#}", e),
    }

    let services = Services::with_embedder(config, Arc::new(ollama));

    let controller = Arc::clone(&services.controller);
    let report = tokio::task::spawn_blocking(move || controller.reload()).await?;
    log_failures(&report);
    info!(
        "Initial load complete: {} of {} collections available",
        services.registry.len(),
        report.collections.len()
    );

    let server = Arc::new(
        collection_server(
            Arc::clone(&services.search),
            Arc::clone(&services.registry),
            Arc::clone(&services.controller),
        )
        .await,
    );

    eprintln!("🌐 Serving MCP on stdio. Press Ctrl+C to stop.");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            result.context("MCP server failed")?;
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    Ok(())
}

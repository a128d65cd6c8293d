use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recall::embeddings::{Embedder, EmbeddingProvider};
use recall::index::{Corpus, InMemoryIndex};
use recall::models::{RetrievalQuery, Role, StrategyKind, VisibilityContext};
use recall::{Config, Indexes, RetrievalCoordinator};

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Hybrid retrieval over a JSON corpus snapshot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a fused query and print the JSON response
    Search(SearchArgs),
    /// Print the children of a summary node
    Expand(ExpandArgs),
}

#[derive(Args)]
struct ContextArgs {
    #[arg(long)]
    tenant: Option<String>,

    #[arg(long)]
    owner: Option<String>,

    /// Query the global layer only
    #[arg(long)]
    global_only: bool,

    /// Treat the caller as an unauthenticated guest
    #[arg(long)]
    guest: bool,
}

impl ContextArgs {
    fn to_context(&self) -> VisibilityContext {
        let mut context = VisibilityContext::new(self.tenant.as_deref(), self.owner.as_deref());
        context.global_only = self.global_only;
        if self.guest {
            context.role = Role::Guest;
        }
        context
    }
}

#[derive(Args)]
struct SearchArgs {
    /// Corpus snapshot: {"items": [...], "entities": [...], "relations": [...]}
    #[arg(long)]
    corpus: PathBuf,

    #[arg(long)]
    query: Option<String>,

    /// JSON array holding a precomputed query vector
    #[arg(long)]
    vector_file: Option<PathBuf>,

    #[command(flatten)]
    context: ContextArgs,

    #[arg(long)]
    limit: Option<u32>,

    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long)]
    max_hops: Option<u32>,

    #[arg(long)]
    decay: Option<f32>,

    /// Comma-separated subset of vector,lexical,hierarchical,graph
    #[arg(long, value_delimiter = ',')]
    strategies: Option<Vec<StrategyKind>>,

    /// Also list the base-level leaves under each summary result
    #[arg(long)]
    with_leaves: bool,
}

#[derive(Args)]
struct ExpandArgs {
    #[arg(long)]
    corpus: PathBuf,

    /// Summary node identifier
    #[arg(long)]
    id: String,

    #[command(flatten)]
    context: ContextArgs,

    /// Walk down to base-level items instead of direct children
    #[arg(long)]
    leaves: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recall=info".into());

    let json = std::env::var("RECALL_LOG_JSON")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    // Logs go to stderr so stdout stays valid JSON.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_corpus(path: &Path, dimensions: usize) -> anyhow::Result<Arc<InMemoryIndex>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus {}", path.display()))?;
    let corpus: Corpus = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid corpus JSON in {}", path.display()))?;

    let index = InMemoryIndex::from_corpus(dimensions, corpus)?;
    tracing::info!(items = index.len(), "Loaded corpus from {}", path.display());
    Ok(Arc::new(index))
}

fn load_vector(path: &Path) -> anyhow::Result<Vec<f32>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vector file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Vector file {} is not a JSON array of numbers", path.display()))
}

async fn build_embedder(config: &Config) -> Option<Arc<dyn Embedder>> {
    let embeddings = config.embeddings.as_ref()?;
    let provider = match EmbeddingProvider::from_config(embeddings) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::warn!("Embedding provider unavailable, text queries run lexical only: {}", e);
            return None;
        }
    };

    // A model of the wrong width can never match the index.
    match provider.verify_dimensions(config.retrieval.dimensions).await {
        Ok(()) => {}
        Err(e) if e.is_input_error() => {
            tracing::warn!("{}, text queries run lexical only", e);
            return None;
        }
        Err(e) => {
            tracing::warn!(model = provider.model(), "Could not check embedding model width: {}", e);
        }
    }
    Some(Arc::new(provider) as Arc<dyn Embedder>)
}

async fn search(config: Config, args: SearchArgs) -> anyhow::Result<()> {
    let index = load_corpus(&args.corpus, config.retrieval.dimensions)?;
    let coordinator =
        RetrievalCoordinator::new(Indexes::from_backend(index), build_embedder(&config).await, &config);

    let context = args.context.to_context();
    let mut query = RetrievalQuery::new(context.clone());
    query.text = args.query;
    query.vector = args.vector_file.as_deref().map(load_vector).transpose()?;
    query.limit = args.limit;
    query.threshold = args.threshold;
    query.strategies = args.strategies;
    query.graph.max_hops = args.max_hops;
    query.graph.decay_factor = args.decay;

    // Ctrl-C abandons the query instead of killing the process mid-write.
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let response = coordinator.retrieve_with_cancel(query, cancel).await?;
    let mut output = serde_json::to_value(&response)?;

    if args.with_leaves {
        let mut leaves = serde_json::Map::new();
        for result in &response.results {
            if let Ok(ids) = coordinator.leaves(&context, &result.id).await {
                if !ids.is_empty() {
                    leaves.insert(result.id.clone(), serde_json::json!(ids));
                }
            }
        }
        output["leaves"] = serde_json::Value::Object(leaves);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn expand(config: Config, args: ExpandArgs) -> anyhow::Result<()> {
    let index = load_corpus(&args.corpus, config.retrieval.dimensions)?;
    let coordinator = RetrievalCoordinator::new(Indexes::from_backend(index), None, &config);
    let context = args.context.to_context();

    let ids = if args.leaves {
        coordinator.leaves(&context, &args.id).await?
    } else {
        coordinator.expand(&context, &args.id).await?
    };

    println!("{}", serde_json::to_string_pretty(&ids)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();

    match cli.command {
        Command::Search(args) => search(config, args).await,
        Command::Expand(args) => expand(config, args).await,
    }
}

use anyhow::Result;
use clap::Parser;
use docchat::config::Config;
use docchat::embedding::FastEmbedder;
use docchat::generation::{AnswerGenerator, ExtractiveGenerator};
use docchat::ingest::IngestPipeline;
use docchat::retrieval::RetrievalPlanner;
use docchat::server::{serve, AppState, InMemoryFileRegistry};
use docchat::session::SessionRegistry;
use docchat::store::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Document-grounded retrieval and chat over PDF documents
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about)]
struct Args {
    /// Path to a TOML config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address for the HTTP server (overrides config)
    #[arg(long, env = "DOCCHAT_BIND_ADDR")]
    bind: Option<String>,

    /// Data directory for persisted documents and sessions (overrides config)
    #[arg(long, env = "DOCCHAT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    config.validate()?;

    let store = Arc::new(DocumentStore::open(config.storage.data_dir.clone())?);
    let embedder = Arc::new(FastEmbedder::from_model_name(&config.embedding.model_name)?);

    let planner = Arc::new(RetrievalPlanner::new(
        embedder.clone(),
        config.retrieval.clone(),
    ));
    let generator = make_generator(&config)?;
    let pipeline = Arc::new(IngestPipeline::new(
        embedder,
        Arc::clone(&store),
        config.chunking.clone(),
        config.embedding.clone(),
    ));
    let sessions = Arc::new(SessionRegistry::new(
        Arc::clone(&store),
        planner,
        generator,
    ));

    let state = AppState {
        store,
        pipeline,
        sessions,
        files: Arc::new(InMemoryFileRegistry::new()),
    };

    serve(state, &config.server.bind_addr).await?;
    Ok(())
}

fn make_generator(config: &Config) -> Result<Arc<dyn AnswerGenerator>> {
    match config.generation.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveGenerator::new())),
        #[cfg(feature = "openai-generator")]
        "openai" => {
            let api_key = std::env::var("DOCCHAT_OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("DOCCHAT_OPENAI_API_KEY is not set"))?;
            Ok(Arc::new(docchat::generation::OpenAiGenerator::new(
                config.generation.openai_base_url.clone(),
                api_key,
                config.generation.openai_model.clone(),
            )))
        }
        other => anyhow::bail!(
            "generation provider '{}' is not available in this build",
            other
        ),
    }
}

use anyhow::Context;
use career_rag_core::{
    discover_pdf_files, BatchReport, CharacterNgramEmbedder, Embedder, EmbeddingConfig,
    IndexAdmin, InMemoryStore, IngestionOrchestrator, OpenAiEmbedder, PineconeStore,
    PipelineConfig, RetrievalOrchestrator, StoreConfig, VectorIndex,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "career-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key for the embeddings endpoint
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    openai_api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-large")]
    embedding_model: String,

    /// Embedding dimensionality; must match the index
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "3072")]
    embedding_dimensions: usize,

    /// Attempts per embedding call for rate-limited or 5xx responses
    #[arg(long, env = "EMBEDDING_MAX_RETRIES", default_value = "3")]
    embedding_max_retries: usize,

    /// Vector store API key
    #[arg(long, env = "PINECONE_API_KEY", default_value = "", hide_env_values = true)]
    pinecone_api_key: String,

    /// Vector index name
    #[arg(long, env = "PINECONE_INDEX_NAME", default_value = "career-documents")]
    pinecone_index: String,

    /// Vector store control-plane URL
    #[arg(long, env = "PINECONE_CONTROL_URL", default_value = "https://api.pinecone.io")]
    pinecone_control_url: String,

    /// Serverless cloud for newly created indexes
    #[arg(long, env = "PINECONE_CLOUD", default_value = "aws")]
    pinecone_cloud: String,

    /// Serverless region for newly created indexes
    #[arg(long, env = "PINECONE_REGION", default_value = "us-east-1")]
    pinecone_region: String,

    /// Seconds to wait between deleting and recreating the index
    #[arg(long, default_value = "5")]
    deletion_grace_secs: u64,

    /// Readiness checks (one per second) before a new index counts as unavailable
    #[arg(long, default_value = "60")]
    ready_poll_attempts: usize,

    /// Matches returned by `retrieve` when `--top-k` is not given
    #[arg(long, env = "RETRIEVAL_TOP_K", default_value = "5")]
    default_top_k: usize,

    /// Use the offline n-gram embedder and a process-local store; no credentials needed
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Chunk window in characters
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Index one PDF into its own namespace.
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },
    /// Index several PDFs, continuing past per-document failures.
    Batch {
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Explicit files, in addition to the folder.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Skip documents whose namespace already holds vectors.
        #[arg(long, default_value_t = false)]
        only_missing: bool,
    },
    /// Delete and recreate the index, then index every PDF in the folder.
    Train {
        #[arg(long)]
        folder: PathBuf,
    },
    /// Report which documents already have vectors stored.
    Sync {
        /// Namespaces to check.
        #[arg(long = "name")]
        names: Vec<String>,
        /// Derive candidate namespaces from the PDFs in this folder.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Fetch the chunks closest to a question.
    Retrieve {
        #[arg(long)]
        query: String,
        /// Namespace to search; repeat to merge several.
        #[arg(long = "namespace", required = true)]
        namespaces: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the assembled grounding context, capped at this many characters.
        #[arg(long)]
        context_chars: Option<usize>,
    },
    /// Per-namespace vector counts.
    Stats,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let embedding = EmbeddingConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: self.embedding_model.clone(),
            dimensions: self.embedding_dimensions,
            max_retries: self.embedding_max_retries,
            ..EmbeddingConfig::default()
        };
        let store = StoreConfig {
            api_key: self.pinecone_api_key.clone(),
            index_name: self.pinecone_index.clone(),
            control_plane_url: self.pinecone_control_url.clone(),
            cloud: self.pinecone_cloud.clone(),
            region: self.pinecone_region.clone(),
            deletion_grace: Duration::from_secs(self.deletion_grace_secs),
            ready_poll_attempts: self.ready_poll_attempts,
            ..StoreConfig::default()
        };

        let mut config = PipelineConfig::new(embedding, store);
        config.ingestion.chunk_size = self.chunk_size;
        config.ingestion.chunk_overlap = self.chunk_overlap;
        config.top_k = self.default_top_k;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config();
    if cli.dry_run {
        config
            .validate_settings()
            .context("invalid pipeline configuration")?;
    } else {
        config.validate().context("invalid pipeline configuration")?;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        index = %config.store.index_name,
        model = %config.embedding.model,
        dry_run = cli.dry_run,
        started_at = %Utc::now().to_rfc3339(),
        "career-rag boot"
    );

    if cli.dry_run {
        let (embedder, store) = offline_backends(&config);
        run(cli.command, &config, embedder, store).await
    } else {
        let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let store = Arc::new(PineconeStore::new(&config.store)?);
        run(cli.command, &config, embedder, store).await
    }
}

fn offline_backends(config: &PipelineConfig) -> (Arc<CharacterNgramEmbedder>, Arc<InMemoryStore>) {
    let dimensions = config.embedding.dimensions;
    let store = InMemoryStore::with_index(config.store.index_name.clone(), dimensions);
    (Arc::new(CharacterNgramEmbedder { dimensions }), Arc::new(store))
}

async fn run<E, S>(
    command: Command,
    config: &PipelineConfig,
    embedder: Arc<E>,
    store: Arc<S>,
) -> anyhow::Result<()>
where
    E: Embedder + 'static,
    S: VectorIndex + IndexAdmin + 'static,
{
    let ingestion = IngestionOrchestrator::new(
        Arc::clone(&embedder),
        Arc::clone(&store),
        config.store.index_name.clone(),
        config.ingestion.clone(),
    )
    .with_deletion_grace(config.store.deletion_grace)
    .with_readiness_polling(
        config.store.ready_poll_interval,
        config.store.ready_poll_attempts,
    );

    match command {
        Command::Ingest { file } => {
            let report = ingestion.ingest_one(&file).await?;
            println!(
                "{} -> namespace={} chunks={} embeddings={} stored={} status={:?}",
                report.filename,
                report.namespace,
                report.chunk_count,
                report.embedding_count,
                report.stored_count,
                report.status
            );
            for failure in report.batch_errors {
                println!("  batch {} failed: {}", failure.batch, failure.error);
            }
        }
        Command::Batch {
            folder,
            mut files,
            only_missing,
        } => {
            if let Some(folder) = folder {
                files.extend(discover_pdf_files(&folder));
            }

            let report = if only_missing {
                let pending = ingestion.ingest_pending(&files).await?;
                for namespace in &pending.already_indexed {
                    println!("skipped {namespace}: already indexed");
                }
                pending.report
            } else {
                ingestion.ingest_batch(&files).await?
            };
            print_batch(&report);
        }
        Command::Train { folder } => {
            let files = discover_pdf_files(&folder);
            info!(folder = %folder.display(), documents = files.len(), "training from scratch");
            let report = ingestion.train_from_scratch(&files).await?;
            print_batch(&report);
        }
        Command::Sync { mut names, folder } => {
            if let Some(folder) = folder {
                names.extend(discover_pdf_files(&folder).iter().filter_map(|path| {
                    path.file_stem()
                        .and_then(|stem| stem.to_str())
                        .map(str::to_string)
                }));
            }

            let report = ingestion.check_sync(&names).await;
            for namespace in &report.indexed {
                println!("indexed  {namespace}");
            }
            for namespace in &report.missing {
                println!("missing  {namespace}");
            }
        }
        Command::Retrieve {
            query,
            namespaces,
            top_k,
            context_chars,
        } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let retrieval =
                RetrievalOrchestrator::new(embedder, store, config.embedding.model.clone());
            let context = if namespaces.len() == 1 {
                retrieval.retrieve(&query, &namespaces[0], top_k).await?
            } else {
                retrieval.retrieve_across(&query, &namespaces, top_k).await?
            };

            println!("query: {}", context.query);
            for chunk in &context.chunks {
                println!(
                    "[{}] score={:.4} chunk={} index={:?}",
                    chunk.namespace, chunk.score, chunk.id, chunk.chunk_index
                );
                println!("  {}", chunk.text);
            }
            if let Some(max_chars) = context_chars {
                println!("context:\n{}", context.grounding_text(max_chars));
            }
        }
        Command::Stats => {
            let stats = store.describe_stats().await?;
            println!(
                "dimension={} total_vectors={}",
                stats.dimension, stats.total_vector_count
            );
            for (namespace, count) in stats.namespaces {
                println!("  {namespace}: {count}");
            }
        }
    }

    Ok(())
}

fn print_batch(report: &BatchReport) {
    for document in &report.documents {
        println!(
            "{} -> namespace={} chunks={} embeddings={} stored={} status={:?}",
            document.filename,
            document.namespace,
            document.chunk_count,
            document.embedding_count,
            document.stored_count,
            document.status
        );
    }
    for failure in &report.errors {
        warn!(file = %failure.filename, reason = %failure.reason, "document failed");
        println!("{} -> failed: {}", failure.filename, failure.reason);
    }
    println!(
        "batch status={:?} succeeded={} failed={}",
        report.status,
        report.documents.len(),
        report.errors.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_falls_back_to_configured_top_k() {
        let cli = Cli::try_parse_from([
            "career-rag",
            "--default-top-k",
            "8",
            "retrieve",
            "--query",
            "rust",
            "--namespace",
            "jane-resume",
        ])
        .unwrap();

        assert_eq!(cli.pipeline_config().top_k, 8);
        match cli.command {
            Command::Retrieve { top_k, .. } => assert_eq!(top_k, None),
            _ => panic!("expected retrieve"),
        }
    }

    #[test]
    fn dry_run_needs_no_credentials() {
        let cli = Cli::try_parse_from([
            "career-rag",
            "--dry-run",
            "--openai-api-key",
            "",
            "--pinecone-api-key",
            "",
            "stats",
        ])
        .unwrap();
        let config = cli.pipeline_config();

        assert!(cli.dry_run);
        assert!(config.validate().is_err());
        assert!(config.validate_settings().is_ok());
    }

    #[tokio::test]
    async fn dry_run_commands_use_the_offline_backends() {
        let config = PipelineConfig::default();
        let (embedder, store) = offline_backends(&config);

        run(
            Command::Sync {
                names: vec!["jane-resume".to_string()],
                folder: None,
            },
            &config,
            Arc::clone(&embedder),
            Arc::clone(&store),
        )
        .await
        .unwrap();
        run(Command::Stats, &config, embedder, Arc::clone(&store))
            .await
            .unwrap();

        let stats = store.describe_stats().await.unwrap();
        assert_eq!(stats.dimension, config.embedding.dimensions);
        assert_eq!(stats.total_vector_count, 0);
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use promptguard_cli::{build_embedder, init_tracing, load_settings, read_corpus};
use promptguard_core::types::IndexSchema;
use promptguard_vector::BackendRegistry;

#[derive(Parser, Debug)]
#[command(version, about = "Seed a similarity backend with a JSONL reference corpus", long_about = None)]
struct Args {
    /// A .jsonl file or a directory of them
    corpus: PathBuf,

    /// Backend to seed; defaults to similarity.default_backend
    #[arg(short, long)]
    backend: Option<String>,

    /// Create the index when it does not exist yet
    #[arg(long, default_value = "false")]
    create: bool,

    /// Directory holding config.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = load_settings(&args.config_dir)?;
    let registry = BackendRegistry::from_settings(&settings, &args.config_dir);
    let id = args.backend.clone().unwrap_or_else(|| settings.similarity.default_backend.clone());
    let backend = registry.get(&id).with_context(|| format!("backend {id} is not configured"))?;

    println!("PromptGuard Indexer\n===================");
    println!("Corpus: {}", args.corpus.display());
    println!("Backend: {} ({}), index {}", id, backend.description(), backend.index_name());

    if !backend.ping().await {
        anyhow::bail!("backend {id} is not reachable");
    }
    let index = backend.index_name().to_string();
    if !backend.index_exists(&index).await? {
        if !args.create {
            anyhow::bail!("index {index} does not exist (pass --create to create it)");
        }
        backend.create_index(&index, &IndexSchema::default()).await?;
        println!("Created index {}", index);
    }

    let entries = read_corpus(&args.corpus)?;
    if entries.is_empty() {
        println!("No corpus entries found");
        registry.close_all().await;
        return Ok(());
    }
    let embedder = build_embedder(&settings, &args.config_dir)?;

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut failed = 0usize;
    let total = entries.len();
    for entry in entries {
        let vector = embedder.embed_text(&entry.text)?;
        let doc = entry.into_document(vector);
        pb.set_message(doc.id.clone());
        if let Err(e) = backend.upsert(&doc).await {
            tracing::error!("[{}][{}] upsert of {} failed: {}", id, index, doc.id, e);
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!("\n✅ Indexed {} of {} documents into {}", total - failed, total, index);
    registry.close_all().await;
    if failed > 0 {
        anyhow::bail!("{failed} document(s) failed to index");
    }
    Ok(())
}

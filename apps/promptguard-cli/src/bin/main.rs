use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use promptguard_cli::{build_embedder, init_tracing, load_settings};
use promptguard_similarity::SimilarityEngine;
use promptguard_vector::BackendRegistry;

#[derive(Parser, Debug)]
#[command(version, about = "Screen prompts against a corpus of known-bad examples", long_about = None)]
struct Args {
    /// Directory holding config.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the similarity pipeline on TEXT and print the result as JSON
    Check {
        /// Switch to this backend before checking
        #[arg(short, long)]
        backend: Option<String>,

        text: String,
    },
    /// List configured backends and their state
    Backends,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let settings = load_settings(&args.config_dir)?;

    let registry = Arc::new(BackendRegistry::from_settings(&settings, &args.config_dir));
    registry.activate().await;

    match args.command {
        Command::Backends => {
            println!("{}", serde_json::to_string_pretty(&registry.backends())?);
        }
        Command::Check { backend, text } => {
            if let Some(id) = backend {
                let changed = registry.switch_active(&id);
                eprintln!("Active backend: {:?} (changed: {})", registry.active_id(), changed);
            }
            let embedder = match build_embedder(&settings, &args.config_dir) {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::error!("Embedder unavailable: {:#}", e);
                    None
                }
            };
            let engine = SimilarityEngine::from_settings(&settings, registry.clone(), embedder)?;
            let result = engine.run(&text).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    registry.close_all().await;
    Ok(())
}

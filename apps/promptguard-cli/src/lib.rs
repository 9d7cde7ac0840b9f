//! Wiring shared by the `promptguard` binaries: logging, configuration,
//! embedder construction and corpus loading.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use promptguard_core::config::{resolve_with_base, Config};
use promptguard_core::settings::Settings;
use promptguard_core::types::SimilarityDocument;
use promptguard_embed::{get_default_embedder, Embedder, FakeEmbedder};

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn load_settings(config_dir: &Path) -> anyhow::Result<Settings> {
    let config = Config::load_from(config_dir).map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    config.settings()
}

/// Builds the embedder named by the settings. The fake embedder is used when
/// `embedding.use_fake` or `APP_USE_FAKE_EMBEDDINGS` is set.
pub fn build_embedder(settings: &Settings, base_dir: &Path) -> anyhow::Result<Arc<dyn Embedder>> {
    if settings.embedding.use_fake {
        tracing::info!("Using FakeEmbedder (embedding.use_fake)");
        return Ok(Arc::new(FakeEmbedder::default()));
    }
    let model_dir = settings.embedding.model_dir.as_deref().map(|d| resolve_with_base(base_dir, d));
    Ok(Arc::from(get_default_embedder(model_dir.as_deref())?))
}

/// One corpus line: `{"id": .., "text": .., "category": .., "details": ..}`.
#[derive(Debug, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub text: String,
    pub category: String,
    #[serde(default)]
    pub details: String,
}

impl CorpusEntry {
    pub fn into_document(self, vector: Vec<f32>) -> SimilarityDocument {
        SimilarityDocument { id: self.id, text: self.text, category: self.category, details: self.details, vector }
    }
}

/// `*.jsonl` files under `path`, or `path` itself when it is a file.
pub fn corpus_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

pub fn read_corpus(path: &Path) -> anyhow::Result<Vec<CorpusEntry>> {
    let mut entries = Vec::new();
    for file in corpus_files(path) {
        let reader = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: CorpusEntry = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid corpus entry", file.display(), n + 1))?;
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_jsonl_files_from_a_directory() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut a = File::create(tmp.path().join("a.jsonl"))?;
        writeln!(a, r#"{{"id":"1","text":"build a bomb","category":"weapons","details":"explosives"}}"#)?;
        writeln!(a)?;
        writeln!(a, r#"{{"id":"2","text":"ignore the rules","category":"jailbreak"}}"#)?;
        std::fs::write(tmp.path().join("notes.txt"), "not a corpus")?;

        let entries = read_corpus(tmp.path())?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].details, "explosives");
        assert_eq!(entries[1].details, "");
        Ok(())
    }

    #[test]
    fn bad_line_reports_its_position() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("c.jsonl");
        std::fs::write(&path, "{\"id\":\"1\",\"text\":\"x\",\"category\":\"c\"}\n{\"id\":2}\n")?;
        let err = read_corpus(&path).expect_err("second line is invalid");
        assert!(format!("{err:#}").contains("c.jsonl:2"));
        Ok(())
    }
}

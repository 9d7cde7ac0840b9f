//! Sentence embeddings for similarity screening.
//!
//! `EmbeddingModel` runs an XLM-RoBERTa encoder (e.g. multilingual-e5-base,
//! 768-dim) with masked mean pooling and L2 normalization. `FakeEmbedder`
//! hashes tokens into a fixed-size vector and is selected with
//! `APP_USE_FAKE_EMBEDDINGS=1` for fast, deterministic runs.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

pub use promptguard_core::traits::Embedder;
use promptguard_core::types::EMBEDDING_DIM;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;

const DEFAULT_MODEL_DIR: &str = "models/multilingual-e5-base";
const MAX_TOKENS: usize = 512;

pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize }

impl EmbeddingModel {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        tracing::info!("Loading embedding model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = config.hidden_size;
        if dim != EMBEDDING_DIM {
            tracing::warn!("Model hidden size {} differs from index dimension {}", dim, EMBEDDING_DIM);
        }
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("Embedding model loaded (dim={})", dim);
        Ok(Self { model, tokenizer, device, dim })
    }

    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_on_device(&self.tokenizer, text, MAX_TOKENS, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_TOKENS), DType::I64, &self.device)?;
        let hidden_states = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let emb = masked_mean_l2(&hidden_states, &attention_mask)?;
        let emb = emb.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != self.dim { return Err(anyhow!("expected {} dims, model produced {}", self.dim, emb.len())); }
        if start.elapsed().as_millis() > 100 { tracing::debug!("Slow embedding: {} ms", start.elapsed().as_millis()); }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        let bytes = std::fs::read(&safetensors)?;
        return Ok(VarBuilder::from_buffered_safetensors(bytes, DType::F32, device)?);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_TOKENS }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Deterministic token-hashing embedder.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim } } }

impl Default for FakeEmbedder { fn default() -> Self { Self::new(EMBEDDING_DIM) } }

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_TOKENS }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let mut v = vec![0f32; self.dim];
            for (i, token) in text.split_whitespace().enumerate() {
                let mut hasher = XxHash64::with_seed(0);
                token.to_lowercase().hash(&mut hasher);
                let h = hasher.finish();
                let idx = (h as usize) % self.dim;
                let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
                v[idx] += val + (i as f32 % 3.0) * 0.01;
            }
            let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
            for x in &mut v { *x /= norm; }
            out.push(v);
        }
        Ok(out)
    }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Build the configured embedder. `model_dir` overrides the directory lookup.
pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() { tracing::info!("Using FakeEmbedder"); return Ok(Box::new(FakeEmbedder::default())); }
    let dir = match model_dir { Some(p) => p.to_path_buf(), None => resolve_model_dir()? };
    Ok(Box::new(EmbeddingModel::new(&dir)?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { tracing::info!("Using {}: {}", var, p.display()); return Ok(p); } }
    }
    let default = Path::new(DEFAULT_MODEL_DIR); if default.exists() { return Ok(default.to_path_buf()); }
    Err(anyhow!("Could not locate embedding model directory (set APP_MODEL_DIR or embedding.model_dir)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_safetensors_weights_from_model_dir() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let w = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], (2, 2), &Device::Cpu)?;
        let tensors: HashMap<String, Tensor> = [("encoder.w".to_string(), w)].into_iter().collect();
        candle_core::safetensors::save(&tensors, tmp.path().join("model.safetensors"))?;

        let vb = load_weights(tmp.path(), &Device::Cpu)?;
        let loaded = vb.get((2, 2), "encoder.w")?.to_vec2::<f32>()?;
        assert_eq!(loaded, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        Ok(())
    }

    #[test]
    fn missing_weights_are_an_error() {
        let tmp = tempfile::tempdir().expect("tmp");
        assert!(load_weights(tmp.path(), &Device::Cpu).is_err());
    }
}

//! Typed settings extracted from the merged configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::ThresholdPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub similarity: SimilaritySettings,
    pub embedding: EmbeddingSettings,
    pub backends: BackendsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilaritySettings {
    pub prompt_index: String,
    pub default_backend: String,
    pub notify_threshold: f32,
    pub block_threshold: f32,
    pub batch_size: usize,
    /// Overall deadline for one engine run; 0 disables it.
    pub run_timeout_secs: u64,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            prompt_index: "similarity-prompt-index".to_string(),
            default_backend: "opensearch".to_string(),
            notify_threshold: 0.7,
            block_threshold: 0.87,
            batch_size: 5,
            run_timeout_secs: 0,
        }
    }
}

impl SimilaritySettings {
    pub fn threshold_policy(&self) -> Result<ThresholdPolicy> {
        ThresholdPolicy::new(self.notify_threshold, self.block_threshold)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory holding `tokenizer.json`, `config.json` and the model weights.
    pub model_dir: Option<String>,
    pub use_fake: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsSettings {
    pub opensearch: Option<HttpBackendSettings>,
    pub elasticsearch: Option<HttpBackendSettings>,
    pub qdrant: Option<HttpBackendSettings>,
    pub lancedb: Option<LanceSettings>,
}

/// Connection parameters of a backend reached over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub pool_size: usize,
    pub timeout_secs: u64,
    pub verify_certs: bool,
}

impl Default for HttpBackendSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            scheme: "https".to_string(),
            user: None,
            password: None,
            api_key: None,
            pool_size: 10,
            timeout_secs: 30,
            verify_certs: true,
        }
    }
}

impl HttpBackendSettings {
    pub fn base_url(&self) -> Result<String> {
        let host = self.host.as_deref().filter(|h| !h.trim().is_empty());
        match (host, self.port) {
            (Some(host), Some(port)) => Ok(format!("{}://{}:{}", self.scheme, host.trim(), port)),
            (None, _) => Err(Error::InvalidConfig("backend host is not set".to_string())),
            (_, None) => Err(Error::InvalidConfig("backend port is not set".to_string())),
        }
    }

    /// Basic auth pair, only when both halves are present.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs.max(1)) }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanceSettings {
    pub uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_host_and_port() {
        let mut s = HttpBackendSettings::default();
        assert!(matches!(s.base_url(), Err(Error::InvalidConfig(_))));
        s.host = Some("search.local".into());
        assert!(s.base_url().is_err());
        s.port = Some(9200);
        assert_eq!(s.base_url().expect("url"), "https://search.local:9200");
    }

    #[test]
    fn basic_auth_needs_both_halves() {
        let mut s = HttpBackendSettings { user: Some("admin".into()), ..Default::default() };
        assert!(s.basic_auth().is_none());
        s.password = Some("secret".into());
        assert_eq!(s.basic_auth(), Some(("admin", "secret")));
    }

    #[test]
    fn run_timeout_zero_disables_deadline() {
        let mut s = SimilaritySettings::default();
        assert!(s.run_timeout().is_none());
        s.run_timeout_secs = 3;
        assert_eq!(s.run_timeout(), Some(Duration::from_secs(3)));
    }
}

//! Set of constructed backends plus the pointer to the active one.
//!
//! The registry is built once, activated with an explicit `activate().await`,
//! and then shared behind an `Arc`. Readers take a snapshot of the active
//! backend through [`BackendRegistry::active`]; switching never disturbs a
//! run that already captured its backend.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use promptguard_core::config::resolve_with_base;
use promptguard_core::settings::Settings;

use crate::backend::{SearchBackend, ELASTICSEARCH, LANCEDB, OPENSEARCH, QDRANT};
use crate::elasticsearch::ElasticsearchBackend;
use crate::error::Result;
use crate::lance::LanceBackend;
use crate::opensearch::OpenSearchBackend;
use crate::qdrant::QdrantBackend;

struct Handle {
    backend: Arc<dyn SearchBackend>,
    enabled: AtomicBool,
}

/// Snapshot of the active backend taken at the start of a run.
#[derive(Clone)]
pub struct ActiveBackend {
    pub id: String,
    pub backend: Arc<dyn SearchBackend>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackendInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub index: String,
    pub enabled: bool,
    pub active: bool,
}

pub struct BackendRegistry {
    default_id: String,
    handles: Vec<Handle>,
    active: RwLock<Option<String>>,
}

impl BackendRegistry {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self { default_id: default_id.into(), handles: Vec::new(), active: RwLock::new(None) }
    }

    /// Adds a handle, disabled until `activate`. A handle with the same id is replaced.
    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) {
        let handle = Handle { backend, enabled: AtomicBool::new(false) };
        match self.handles.iter_mut().find(|h| h.backend.id() == handle.backend.id()) {
            Some(existing) => {
                tracing::warn!("Backend {} registered twice, keeping the latest", handle.backend.id());
                *existing = handle;
            }
            None => self.handles.push(handle),
        }
    }

    /// Constructs every configured backend. Backends whose settings are
    /// incomplete are logged and left out.
    pub fn from_settings(settings: &Settings, base_dir: &Path) -> Self {
        let sim = &settings.similarity;
        let mut registry = Self::new(sim.default_backend.clone());
        let index = sim.prompt_index.as_str();
        let backends = &settings.backends;

        if let Some(cfg) = &backends.opensearch {
            registry.register_built(OPENSEARCH, OpenSearchBackend::new(cfg, index).map(|b| Arc::new(b) as Arc<dyn SearchBackend>));
        }
        if let Some(cfg) = &backends.elasticsearch {
            registry.register_built(ELASTICSEARCH, ElasticsearchBackend::new(cfg, index).map(|b| Arc::new(b) as Arc<dyn SearchBackend>));
        }
        if let Some(cfg) = &backends.qdrant {
            let built = QdrantBackend::new(cfg, index, sim.notify_threshold).map(|b| Arc::new(b) as Arc<dyn SearchBackend>);
            registry.register_built(QDRANT, built);
        }
        if let Some(cfg) = &backends.lancedb {
            match cfg.uri.as_deref().filter(|u| !u.trim().is_empty()) {
                Some(uri) => {
                    let uri = resolve_with_base(base_dir, uri);
                    registry.register(Arc::new(LanceBackend::new(uri.to_string_lossy(), index)));
                }
                None => tracing::warn!("[{}] skipped: uri is not set", LANCEDB),
            }
        }
        tracing::info!("Constructed {} similarity backend(s)", registry.handles.len());
        registry
    }

    fn register_built(&mut self, id: &str, built: Result<Arc<dyn SearchBackend>>) {
        match built {
            Ok(backend) => self.register(backend),
            Err(e) => tracing::warn!("[{}] skipped: {}", id, e),
        }
    }

    /// Checks every handle and enables the ones whose index is reachable,
    /// then picks an active backend. Failures only disable the handle.
    pub async fn activate(&self) {
        for handle in &self.handles {
            let b = &handle.backend;
            let ok = if b.ping().await {
                match b.index_exists(b.index_name()).await {
                    Ok(true) => true,
                    Ok(false) => {
                        tracing::warn!("[{}][{}] index not found, backend disabled", b.id(), b.index_name());
                        false
                    }
                    Err(e) => {
                        tracing::warn!("[{}][{}] index check failed, backend disabled: {}", b.id(), b.index_name(), e);
                        false
                    }
                }
            } else {
                tracing::warn!("[{}] not reachable, backend disabled", b.id());
                false
            };
            if ok {
                tracing::info!("[{}][{}] backend enabled", b.id(), b.index_name());
            }
            handle.enabled.store(ok, Ordering::Release);
        }
        {
            let mut active = self.active.write();
            if active.as_deref().is_some_and(|id| !self.is_enabled(id)) {
                *active = None;
            }
        }
        self.select_active(None);
    }

    fn handle(&self, id: &str) -> Option<&Handle> { self.handles.iter().find(|h| h.backend.id() == id) }

    fn is_enabled(&self, id: &str) -> bool { self.handle(id).is_some_and(|h| h.enabled.load(Ordering::Acquire)) }

    /// Chooses the active backend: `id` if known and enabled, else the
    /// configured default, else (only when nothing is active yet) the first
    /// enabled handle. Returns the active id afterwards.
    pub fn select_active(&self, id: Option<&str>) -> Option<String> {
        let mut active = self.active.write();
        if let Some(id) = id {
            if self.is_enabled(id) {
                *active = Some(id.to_string());
                tracing::info!("Active similarity backend: {}", id);
                return active.clone();
            }
            tracing::warn!("Backend {} is unknown or disabled", id);
        }
        if self.is_enabled(&self.default_id) {
            if active.as_deref() != Some(self.default_id.as_str()) {
                tracing::info!("Active similarity backend: {} (default)", self.default_id);
            }
            *active = Some(self.default_id.clone());
        } else if active.is_none() {
            match self.handles.iter().find(|h| h.enabled.load(Ordering::Acquire)) {
                Some(h) => {
                    tracing::info!("Active similarity backend: {} (first available)", h.backend.id());
                    *active = Some(h.backend.id().to_string());
                }
                None => tracing::warn!("No similarity backend is available"),
            }
        } else {
            tracing::warn!("Default backend {} unavailable, keeping {:?}", self.default_id, active.as_deref());
        }
        active.clone()
    }

    /// Returns `true` when the active backend changed.
    pub fn switch_active(&self, id: &str) -> bool {
        let before = self.active_id();
        let after = self.select_active(Some(id));
        before != after
    }

    pub fn active(&self) -> Option<ActiveBackend> {
        let id = self.active.read().clone()?;
        let handle = self.handle(&id)?;
        Some(ActiveBackend { id, backend: handle.backend.clone() })
    }

    pub fn has_active(&self) -> bool { self.active.read().is_some() }

    pub fn active_id(&self) -> Option<String> { self.active.read().clone() }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SearchBackend>> { self.handle(id).map(|h| h.backend.clone()) }

    pub fn backends(&self) -> Vec<BackendInfo> {
        let active = self.active_id();
        self.handles
            .iter()
            .map(|h| BackendInfo {
                id: h.backend.id().to_string(),
                name: h.backend.name().to_string(),
                description: h.backend.description().to_string(),
                index: h.backend.index_name().to_string(),
                enabled: h.enabled.load(Ordering::Acquire),
                active: active.as_deref() == Some(h.backend.id()),
            })
            .collect()
    }

    pub async fn close_all(&self) {
        for handle in &self.handles {
            handle.backend.close().await;
        }
        tracing::info!("Closed {} similarity backend(s)", self.handles.len());
    }
}

use std::path::Path;
use std::sync::Arc;

use promptguard_core::settings::{HttpBackendSettings, LanceSettings, Settings};
use promptguard_core::types::IndexSchema;
use promptguard_vector::{BackendRegistry, MemoryBackend, SearchBackend};

const INDEX: &str = "similarity-prompt-index";

async fn ready(id: &str) -> Arc<MemoryBackend> {
    let b = Arc::new(MemoryBackend::with_id(id, INDEX));
    b.create_index(INDEX, &IndexSchema::default()).await.expect("create");
    b
}

fn registry_of(default_id: &str, backends: &[Arc<MemoryBackend>]) -> BackendRegistry {
    let mut reg = BackendRegistry::new(default_id);
    for b in backends {
        reg.register(b.clone());
    }
    reg
}

#[tokio::test]
async fn default_backend_wins_when_enabled() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("beta", &[a, b]);
    assert!(!reg.has_active());
    reg.activate().await;
    assert_eq!(reg.active_id().as_deref(), Some("beta"));
    assert_eq!(reg.active().map(|a| a.backend.id().to_string()).as_deref(), Some("beta"));
}

#[tokio::test]
async fn falls_back_to_first_enabled_in_registration_order() {
    let down = ready("opensearch").await;
    down.set_reachable(false);
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("opensearch", &[down, a, b]);
    reg.activate().await;
    assert_eq!(reg.active_id().as_deref(), Some("alpha"));
    let infos = reg.backends();
    assert_eq!(infos.len(), 3);
    assert!(!infos[0].enabled);
    assert!(infos[1].enabled && infos[1].active);
}

#[tokio::test]
async fn missing_index_disables_backend() {
    let no_index = Arc::new(MemoryBackend::with_id("alpha", INDEX));
    let reg = registry_of("alpha", &[no_index]);
    reg.activate().await;
    assert!(!reg.has_active());
    assert!(reg.active().is_none());
}

#[tokio::test]
async fn switching_reports_whether_active_changed() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("alpha", &[a, b]);
    reg.activate().await;

    assert!(reg.switch_active("beta"));
    assert_eq!(reg.active_id().as_deref(), Some("beta"));
    assert!(!reg.switch_active("beta"));
    // Unknown ids fall back to the default.
    assert!(reg.switch_active("nope"));
    assert_eq!(reg.active_id().as_deref(), Some("alpha"));
}

#[tokio::test]
async fn unknown_id_without_usable_default_keeps_current() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("gamma", &[a, b]);
    reg.activate().await;
    assert_eq!(reg.active_id().as_deref(), Some("alpha"));
    assert!(reg.switch_active("beta"));
    assert!(!reg.switch_active("gamma"));
    assert_eq!(reg.active_id().as_deref(), Some("beta"));
}

#[tokio::test]
async fn reactivation_drops_a_backend_that_went_away() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("alpha", &[a.clone(), b]);
    reg.activate().await;
    assert_eq!(reg.active_id().as_deref(), Some("alpha"));
    a.set_reachable(false);
    reg.activate().await;
    assert_eq!(reg.active_id().as_deref(), Some("beta"));
}

#[tokio::test]
async fn captured_backend_survives_a_switch() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("alpha", &[a, b]);
    reg.activate().await;
    let snapshot = reg.active().expect("active");
    reg.switch_active("beta");
    assert_eq!(snapshot.id, "alpha");
    assert_eq!(snapshot.backend.id(), "alpha");
}

#[tokio::test]
async fn close_all_closes_every_handle() {
    let a = ready("alpha").await;
    let b = ready("beta").await;
    let reg = registry_of("alpha", &[a.clone(), b.clone()]);
    reg.close_all().await;
    reg.close_all().await;
    assert!(a.is_closed() && b.is_closed());
}

#[test]
fn incomplete_settings_skip_the_backend() {
    let mut settings = Settings::default();
    settings.backends.opensearch = Some(HttpBackendSettings { host: Some("localhost".into()), ..Default::default() });
    settings.backends.qdrant = Some(HttpBackendSettings {
        host: Some("localhost".into()),
        port: Some(6333),
        scheme: "http".into(),
        ..Default::default()
    });
    settings.backends.lancedb = Some(LanceSettings { uri: None });
    let reg = BackendRegistry::from_settings(&settings, Path::new("."));
    let ids: Vec<String> = reg.backends().into_iter().map(|b| b.id).collect();
    assert_eq!(ids, vec!["qdrant".to_string()]);
    assert!(reg.get("opensearch").is_none());
    assert!(reg.get("qdrant").is_some());
}

#[tokio::test]
async fn listing_reports_name_description_and_index() {
    let a = ready("alpha").await;
    let reg = registry_of("alpha", &[a]);
    reg.activate().await;
    let info = reg.backends().into_iter().next().expect("one backend");
    assert_eq!(info.id, "alpha");
    assert_eq!(info.name, "Memory Client");
    assert!(!info.description.is_empty());
    assert_eq!(info.index, INDEX);
    assert!(info.enabled && info.active);

    let json = serde_json::to_value(&info).expect("json");
    for key in ["id", "name", "description", "index", "enabled", "active"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

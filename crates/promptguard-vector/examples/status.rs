use std::path::Path;

use promptguard_core::config::Config;
use promptguard_vector::BackendRegistry;

/// Prints reachability and index state of every configured backend.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ws_root = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap_or(Path::new("."));
    let settings = Config::load_from(ws_root)?.settings()?;
    let registry = BackendRegistry::from_settings(&settings, ws_root);
    for id in registry.backends().into_iter().map(|b| b.id) {
        if let Some(backend) = registry.get(&id) {
            let up = backend.ping().await;
            let exists = if up { backend.index_exists(backend.index_name()).await.ok() } else { None };
            println!("{}: reachable={} index={} exists={:?}", id, up, backend.index_name(), exists);
        }
    }
    registry.activate().await;
    println!("active: {:?}", registry.active_id());
    registry.close_all().await;
    Ok(())
}

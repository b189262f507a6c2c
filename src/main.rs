use std::sync::Arc;

use anyhow::Context;
use gravatar_privacy_lib::build_engine;
use gravatar_privacy_lib::modules::{http_api, kv_store::SqliteStore, logger, settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = settings::get_data_dir().map_err(anyhow::Error::msg)?;
    let settings = settings::load_settings(&data_dir).map_err(anyhow::Error::msg)?;
    let _guard = logger::init_logger(&data_dir, settings.log_to_file).map_err(anyhow::Error::msg)?;

    let db_path = settings.database_path(&data_dir);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening {}", db_path.display()))?;
    tracing::info!("[Main] Data dir: {}", data_dir.display());
    match store.keys() {
        Ok(keys) => tracing::info!("[Main] Store holds {} key(s): {:?}", keys.len(), keys),
        Err(e) => tracing::warn!("[Main] Could not list store keys: {}", e),
    }

    // Write back so newly added fields show up with their defaults
    if let Err(e) = settings::save_settings(&data_dir, &settings) {
        tracing::warn!("[Main] {}", e);
    }

    let engine = Arc::new(build_engine(Arc::new(store)));
    http_api::start_server(&settings, engine)
        .await
        .map_err(anyhow::Error::msg)?;
    Ok(())
}

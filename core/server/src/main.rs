//! VidVault server entry point.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vidvault_server::{router, AppState, ServerConfig, SqliteCatalog};
use vidvault_storage::CipherStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        addr = %config.bind_addr,
        encrypted = %config.ciphertext_root.display(),
        scratch = %config.scratch_root.display(),
        "starting vidvault"
    );

    let store = Arc::new(CipherStore::new(
        config.ciphertext_root.clone(),
        config.scratch_root.clone(),
    )?);
    let catalog = Arc::new(SqliteCatalog::open(&config.db_path)?);

    let state = AppState::new(catalog, store, config.key, config.max_upload_bytes);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

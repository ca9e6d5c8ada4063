#![forbid(unsafe_code)]

use std::sync::Arc;

use element_leaderboard::{
    http, mirror::RestMirror, restore, ElementCatalog, FileStore, LeaderboardService, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    let catalog = ElementCatalog::load(config.catalog_path.as_deref());
    let store = Arc::new(FileStore::open(&config.data_dir)?);

    if let Some(path) = &config.restore_file {
        match restore::restore_from_file(&*store, &*store, path, catalog.size()) {
            Ok(summary) => log::info!(
                "[RESTORE] file:{} players:{} accounts:{} skipped:{}",
                path.display(),
                summary.players,
                summary.accounts,
                summary.skipped
            ),
            Err(err) => {
                log::error!("[RESTORE] file:{} failed error:{}", path.display(), err);
                return Err(err.into());
            }
        }
    }

    let elements = catalog.size();
    let mut service = LeaderboardService::new(store.clone(), store, catalog);
    if let Some(mirror) = &config.mirror {
        log::info!("[MIRROR] enabled base:{}", mirror.base_url);
        service = service.with_mirror(Arc::new(RestMirror::new(
            &mirror.base_url,
            mirror.auth_token.clone(),
            mirror.timeout,
        )));
    }

    let app = http::router(Arc::new(service));

    log::info!(
        "element_leaderboard_http listening on http://{} (data_dir={} mirror={} elements={})",
        config.bind,
        config.data_dir.display(),
        config.mirror.is_some(),
        elements
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for shutdown signal: {}", err);
    }
    log::info!("shutting down");
}

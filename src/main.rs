use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recommend_api::{
    api::{create_router, state::select_scorer, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache, ResponseCache, Store},
    services::{bootstrap, CorpusSource, ModelBuilder, RetrainingPipeline},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recommend_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let store = Store::new(pool);

    // No generation, no service: a failed first build aborts startup
    let builder = ModelBuilder::from_config(&config);
    let registry = bootstrap(&store, &builder).await.map_err(|e| {
        tracing::error!(error = %e, "Initial model build failed");
        anyhow::anyhow!("Initial model build failed: {}", e)
    })?;
    tracing::info!(generation = registry.current().id(), "Models loaded");

    let source: Arc<dyn CorpusSource> = Arc::new(store.clone());
    let (retraining, retraining_handle) =
        RetrainingPipeline::spawn(source, builder, registry.clone());

    let (cache, cache_handle) = match &config.redis_url {
        Some(url) => {
            let (cache, handle) = Cache::new(create_redis_client(url)?).await?;
            tracing::info!("Response cache enabled");
            (Some(Arc::new(cache) as Arc<dyn ResponseCache>), Some(handle))
        }
        None => (None, None),
    };

    let state = AppState::new(
        &config,
        registry,
        store,
        retraining,
        select_scorer(&config),
        cache,
    )?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    retraining_handle.shutdown().await;
    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

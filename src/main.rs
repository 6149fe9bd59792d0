use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use smartcoat_backend::core::config::AppPaths;
use smartcoat_backend::core::logging;
use smartcoat_backend::server::router::router;
use smartcoat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging first: state initialization warns about missing API keys and
    // freshly written default config.
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths).await?;

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(8080);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on {}", addr);
    tracing::info!(
        "Embedding backend: {}, metric: {:?}",
        state.config.embedding.backend,
        state.config.retrieval.metric
    );

    let app: Router = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

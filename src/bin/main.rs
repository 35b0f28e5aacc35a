use anyhow::Result;
use tracing_subscriber::EnvFilter;
use wa_orchestrator::config::ensure_config_dir;
use wa_orchestrator::create_app;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    ensure_config_dir();
    let (state, app) = create_app().await?;

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!(
        providers = ?state.orchestrator.available_providers(),
        "wa-orchestrator listening on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use promokita_core::{load_platform_catalog, Environment, PersistenceGateway};
use promokita_scraper::Orchestrator;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(promokita_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = promokita_db::PoolConfig::from_app_config(&config);
    let pool = promokita_db::connect_pool(&config.database_url, pool_config).await?;
    promokita_db::run_migrations(&pool).await?;

    let mut catalog = load_platform_catalog(&config.platforms_path)?;
    catalog.apply_enable_overrides(|key| std::env::var(key));
    tracing::info!(
        platforms = catalog.enabled_by_priority().len(),
        fetch_mode = %config.fetch_mode,
        "platform catalog loaded"
    );

    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(promokita_db::PgGateway::new(pool.clone()));
    let orchestrator = Arc::new(
        Orchestrator::from_config(&config, &catalog, gateway)
            .map_err(|e| anyhow::anyhow!("orchestrator setup failed: {e}"))?,
    );

    let _scheduler = scheduler::build_scheduler(
        pool.clone(),
        Arc::clone(&orchestrator),
        config.scrape_interval_secs,
    )
    .await?;

    let auth = AuthState::from_config(
        &config.api_tokens,
        matches!(config.env, Environment::Development),
    );
    let app = build_app(
        AppState {
            pool,
            orchestrator: Arc::clone(&orchestrator),
        },
        auth,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}

mod api;
mod middleware;
mod rankings;
mod scheduler;

use std::sync::Arc;

use chanrank_collector::Pipeline;
use chanrank_core::RankingStore;
use chanrank_db::{PgRankingStore, PoolConfig};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    rankings::{RankingService, ReferenceDataset, ServiceSettings},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(chanrank_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let plan = Arc::new(chanrank_core::load_plan(&config.plan_path)?);

    // Lazy so the server still answers from fallback data while Postgres is down.
    let pool =
        chanrank_db::connect_lazy(&config.database_url, PoolConfig::from_app_config(&config))?;
    match chanrank_db::run_migrations(&pool).await {
        Ok(applied) => tracing::info!(applied, "database migrations up to date"),
        Err(e) => tracing::warn!(
            error = %e,
            "could not run migrations; database may be unavailable"
        ),
    }

    let store: Arc<dyn RankingStore> = Arc::new(PgRankingStore::new(pool.clone()));
    let pipeline = Arc::new(Pipeline::from_app_config(
        &config,
        plan,
        Arc::clone(&store),
    )?);
    let reference = ReferenceDataset::embedded();
    if let Ok(dataset) = &reference {
        tracing::info!(channels = dataset.len(), "reference dataset loaded");
    }
    let rankings = Arc::new(RankingService::new(
        store,
        Some(Arc::clone(&pipeline)),
        reference,
        &ServiceSettings::from_app_config(&config),
    ));

    let _scheduler = scheduler::build_scheduler(
        pool.clone(),
        Arc::clone(&pipeline),
        config.collect_cron.as_deref(),
    )
    .await?;

    let app = build_app(AppState {
        pool,
        rankings,
        key_pool: Arc::clone(pipeline.key_pool()),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "chanrank server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
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

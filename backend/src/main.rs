use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowdesk_backend::{
    config::Config,
    database, handlers,
    jobs::{JobScheduler, JobStatus, OutboxDispatchJob},
    mailer_from_config,
    store::PgStore,
    AppState, Stores,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let stores = Stores::shared(Arc::new(PgStore::new(db_pool.clone())));
    let mailer = mailer_from_config(&config.smtp);
    let app_state = Arc::new(AppState::new(config.clone(), stores, mailer, Some(db_pool)));

    let mut scheduler = JobScheduler::new(
        OutboxDispatchJob::new(app_state.outbox.clone()),
        config.outbox.clone(),
    )
    .await?;
    scheduler.start().await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Flowdesk Automation API v0.1.0" }))
        .merge(handlers::api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Deliver whatever is due before exiting
    if let Err(e) = scheduler.run_job_now("outbox_dispatch").await {
        tracing::warn!("Final outbox dispatch failed: {}", e);
    }
    let failed_runs = scheduler
        .execution_logs()
        .await
        .iter()
        .filter(|log| log.status == JobStatus::Failed)
        .count();
    scheduler.shutdown().await?;
    tracing::info!("Server stopped ({} failed job runs recorded)", failed_runs);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

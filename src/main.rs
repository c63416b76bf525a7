use dotenvy::dotenv;
use rust_document_backend::config::AppConfig;
use rust_document_backend::infrastructure::{database, storage};
use rust_document_backend::services::document_service::DocumentService;
use rust_document_backend::services::nlp;
use rust_document_backend::services::rewrite::RewriteEngine;
use rust_document_backend::services::watchdog::StaleDocumentWatchdog;
use rust_document_backend::{create_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_document_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Document Backend...");

    let config = AppConfig::from_env();
    info!(
        "🛡️  Upload Config: Max Size={}MB, Stale After={:?}, Inline Modification={}",
        config.max_file_size / 1024 / 1024,
        config.stale_after,
        config.inline_modification
    );

    let db = database::setup_database().await?;
    let blob_storage = storage::setup_storage(&config).await?;

    let engine = Arc::new(RewriteEngine::new(nlp::create_rewriter(&config)));
    let documents = Arc::new(DocumentService::new(
        db.clone(),
        blob_storage.clone(),
        engine,
    ));

    let state = AppState {
        db: db.clone(),
        storage: blob_storage,
        documents: documents.clone(),
        config: config.clone(),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let watchdog = StaleDocumentWatchdog::new(
        db,
        documents.locks().clone(),
        config.stale_after,
        config.sweep_interval,
        shutdown_rx,
    );
    tokio::spawn(async move {
        watchdog.run().await;
    });

    let app = create_app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 8000));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}

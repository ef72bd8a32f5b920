use std::sync::Arc;

use lms_flashcards::config::Config;
use lms_flashcards::db::DatabaseProxy;
use lms_flashcards::logging::init_tracing;
use lms_flashcards::seed::seed_from_file;
use lms_flashcards::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config);

    let db_proxy = match DatabaseProxy::connect(&config.database_url).await {
        Ok(proxy) => Arc::new(proxy),
        Err(err) => {
            tracing::error!(error = %err, url = %config.database_url, "database initialization failed");
            std::process::exit(1);
        }
    };

    if let Some(path) = config.seed_file.as_deref() {
        if let Err(err) = seed_from_file(&db_proxy, path).await {
            tracing::error!(error = %err, "directory seed failed");
            std::process::exit(1);
        }
    }

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set, every authenticated request will be rejected");
    }

    let addr = config.bind_addr();
    let state = AppState::new(Arc::clone(&db_proxy), config);
    let app = lms_flashcards::create_app(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "lms-flashcards listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("HTTP server stopped, closing database pool");
    db_proxy.close().await;
    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

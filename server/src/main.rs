mod config;
mod error;
mod hooks;
mod persistence;
mod service;

use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use persistence::Database;
use service::RecordService;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with span durations, to a daily rolling file when a
/// log directory is configured.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let appender = tracing_appender::rolling::daily(dir, "tournament-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_span_events(FmtSpan::CLOSE)
                .init();
            None
        }
    }
}

/// Log committed record changes until the channel closes.
fn spawn_change_logger(service: &RecordService) {
    let mut changes = service.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => tracing::debug!(
                    action = ?change.action,
                    collection = %change.collection,
                    id = %change.id,
                    "Record changed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change log lagging behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::ServerConfig::from_env();
    let _guard = init_tracing(config.log_dir.as_deref());

    tracing::info!("Starting tournament server");
    tracing::info!("Using data directory: {}", config.data_dir.display());

    let db = Database::open(&config.database_path(), hooks::model_hooks()).await?;
    let service = RecordService::new(db);
    spawn_change_logger(&service);

    let listener = TcpListener::bind(&config.addr).await?;
    tracing::info!("Server listening on {}", config.addr);

    axum::serve(listener, service::endpoints::router(service)).await?;

    Ok(())
}

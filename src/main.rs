use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Duration;
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod db;
mod error;
mod handlers;
mod line;
mod llm;
mod record;
mod server;
mod session;
mod state;
mod storage;
mod utils;

use config::{SessionStoreKind, CONFIG};
use db::database::SqliteSessionStore;
use line::LineClient;
use llm::{GeminiClient, UsageTracker};
use session::{InMemorySessionStore, SessionRepository};
use state::{AppState, RouterSettings};
use storage::SheetsRecorder;
use utils::logging::init_logging;

async fn build_session_store() -> anyhow::Result<Arc<dyn SessionRepository>> {
    let timeout = Duration::seconds(CONFIG.session_timeout_seconds as i64);
    match CONFIG.session_store {
        SessionStoreKind::Memory => {
            info!("Using in-memory sessions (reset on restart)");
            Ok(Arc::new(InMemorySessionStore::new(timeout)))
        }
        SessionStoreKind::Sqlite => {
            let store = SqliteSessionStore::init(&CONFIG.database_url, timeout).await?;
            store.health_check().await?;
            info!("Using SQLite sessions at {}", CONFIG.database_url);
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {err}");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.line_channel_access_token.is_empty() || CONFIG.line_channel_secret.is_empty() {
        return Err(anyhow!(
            "LINE_CHANNEL_ACCESS_TOKEN and LINE_CHANNEL_SECRET are required"
        ));
    }
    if CONFIG.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; model calls will fail");
    }
    if !CONFIG.sheets_enabled() {
        warn!("Google Sheets is not configured; records will not be saved");
    }

    info!("Starting LINE receipt bot");
    let line_client = Arc::new(LineClient::from_config(&CONFIG));
    let state = AppState {
        sessions: build_session_store().await?,
        model: Arc::new(GeminiClient::from_config(&CONFIG)),
        messenger: line_client.clone(),
        fetcher: line_client,
        records: Arc::new(SheetsRecorder::from_config(&CONFIG)),
        usage: Arc::new(UsageTracker::new()),
        settings: Arc::new(RouterSettings::from_config(&CONFIG)),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

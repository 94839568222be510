use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod api;
mod feedback;
mod interface;
mod manager;
mod message;
mod notify;
mod review;
mod session;
mod store;
#[cfg(test)]
mod testutil;

use api::ApiClient;
use interface::cli::CliInterface;
use manager::ChatManager;
use review::ReviewConsole;
use session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Pharos starting...");

    // Client-side storage lives in ~/.pharos/pharos.db unless overridden.
    let db_path = match std::env::var("PHAROS_DB") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let home_dir = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            std::path::Path::new(&home_dir)
                .join(".pharos")
                .join("pharos.db")
        }
    };

    info!("Initializing store at {}", db_path.display());
    let store = store::Store::new(&db_path).await?;
    store.init().await?;
    let sessions = SessionStore::new(store);

    let base_url = std::env::var("PHAROS_BACKEND_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());
    info!("Using backend at {}", base_url);
    let api = Arc::new(ApiClient::new(&base_url)?);

    // The review console needs a bearer credential from the (external)
    // reviewer login; without one, only the asker side is available.
    let console = match std::env::var("PHAROS_REVIEWER_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            api.set_token(token.trim());
            info!("Reviewer credential found, review console enabled");
            Some(ReviewConsole::new(api.clone()))
        }
        _ => {
            info!("No reviewer credential found, review console disabled.");
            None
        }
    };

    let poll_every = std::env::var("PHAROS_POLL_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(notify::DEFAULT_POLL_INTERVAL);

    let manager = ChatManager::new(api.clone(), sessions).await;
    let cli = CliInterface::new(manager, api, console, poll_every);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = cli.run() => {
            if let Err(e) = res {
                error!("Interface stopped with error: {}", e);
            }
        }
    }

    Ok(())
}

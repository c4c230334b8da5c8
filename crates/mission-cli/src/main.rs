mod config;
mod console;
mod menu;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing::info;

use mission_api::{IdentityManager, MissionManager};
use mission_db::Database;

use crate::config::{Config, DEFAULT_LOG_FILTER};
use crate::console::Console;
use crate::menu::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they never interleave with the menu on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();

    // The only fatal failure: no store, no session
    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let db = Arc::new(db);

    let app = App::new(IdentityManager::new(db.clone()), MissionManager::new(db.clone()));
    let mut console = Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());

    let session = app.run(&mut console).await;

    // Managers hold the other handles; release them before closing the store
    drop(app);
    match Arc::try_unwrap(db) {
        Ok(db) => db.close()?,
        Err(_) => tracing::warn!("Database still shared at shutdown; leaving it to drop"),
    }

    session?;
    info!("Session ended");
    Ok(())
}

//! of-mirror binary
//!
//! Bootstraps the process (credentials, configuration, ffmpeg, key
//! material), verifies the platform login, and hands off to the run
//! controller. With no arguments it runs the interactive session; with any
//! argument it performs one silent pass from static configuration.

use of_mirror::config::{Auth, Config};
use of_mirror::ui::{IndicatifProgress, TerminalPrompter};
use of_mirror::{DbCache, DiskStore, OnlyFansClient, Result, RunController, SigningRules, bootstrap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    bootstrap::check_os_compatibility()?;

    let auth = Auth::load(Path::new("auth.json"))?;
    let config = Config::load(Path::new("config.json"))?;
    let ffmpeg = bootstrap::locate_ffmpeg(&config, &auth)?;
    let key_strategy = bootstrap::detect_key_strategy(Path::new("."));
    let rules = SigningRules::load_or_default(Path::new("rules.json"))?;

    let client = Arc::new(OnlyFansClient::new(auth.clone(), rules)?);
    match client.verify_login().await {
        Ok(me) => {
            tracing::info!(user = me.username.as_deref().unwrap_or("?"), "logged in");
        }
        Err(e) => {
            tracing::error!("login failed, check the credentials in auth.json");
            return Err(e);
        }
    }

    let db = Arc::new(DbCache::new());
    let store = Arc::new(DiskStore::new(
        reqwest::Client::new(),
        db.clone(),
        ffmpeg,
        auth.user_agent.clone(),
    ));

    // Any CLI argument forces one silent pass, on top of the config flag
    let silent = std::env::args().len() > 1;
    let interactive = !silent && !config.non_interactive_mode;

    let mut controller = RunController::new(
        client,
        store,
        db,
        Arc::new(IndicatifProgress::new()),
        Arc::new(TerminalPrompter::new()),
        key_strategy,
        config,
        Some(PathBuf::from("config.json")),
    );

    tokio::select! {
        result = controller.run_session(interactive) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    }
}

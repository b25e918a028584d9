// Declare the modules
pub mod api;
pub mod auth;
pub mod cache;
pub mod commands;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod history;
pub mod models;
pub mod routes;
pub mod session;
pub mod sse;
pub mod state;
pub mod storage;

use config::Config;
use state::AppState;

pub fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    log::info!("Using API at {}", config.api_base_url);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let state = AppState::initialize(&config).await?;
        commands::repl(&state).await
    })
}

// src/main.rs
use env_logger::{Builder, Env};
use log::{error, info};
use paper_broker::auth::SessionStore;
use paper_broker::db::Database;
use paper_broker::quote::AlphaVantage;
use paper_broker::{routes, AppState, Config};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let quotes = match AlphaVantage::new(config.quote_base_url.clone(), config.api_key.clone()) {
        Ok(quotes) => quotes,
        Err(e) => {
            error!("Failed to build quote client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        db,
        quotes: Arc::new(quotes),
        sessions: SessionStore::new(&config.session_secret),
        starting_cash: config.starting_cash,
    };

    info!("Server running on http://{}", config.listen_addr);
    warp::serve(routes(state)).run(config.listen_addr).await;
}

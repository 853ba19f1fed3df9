use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use citeview::file_search::FileSearchClient;
use citeview::search::SearchService;
use citeview::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    if config.oracle.api_key.is_none() {
        tracing::warn!("no FILE_SEARCH_API_KEY or GEMINI_API_KEY set; searches will be rejected upstream");
    }

    let client = FileSearchClient::new(&config.oracle)?;
    let search = SearchService::new(client, config.render_options()).with_limits(
        Duration::from_secs(config.session_idle_secs),
        config.max_sessions,
    );

    run_server(config, search).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

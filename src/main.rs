use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use matchday::config::Config;
use matchday::http;

const DEFAULT_LOG_FILTER: &str = "matchday=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;
    http::start_server(config).await
}

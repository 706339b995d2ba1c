use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use switchboard::clipboard::Osc52Clipboard;
use switchboard::config::Config;
use switchboard::driver;
use switchboard::net::HttpBackend;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("switchboard=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::load()?;
    tracing::info!(?config, "client starting");

    let backend = HttpBackend::new(&config)?;
    driver::run(config, Arc::new(backend), Box::new(Osc52Clipboard::stdout())).await
}

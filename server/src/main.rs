use anyhow::Result;
use tracing::{error, info};

use server::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Log every panic with the site it came from; the HTTP layer turns
    // handler panics into 500s and the render pipeline funnels producer
    // panics through the frame channel, so none of them kill the process.
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(source = %location, "panic: {info}");
    }));

    let config = Config::from_env();
    info!(
        version = %config.app_version,
        port = config.port,
        engine_url = %config.engine_url,
        media_url = %config.media_url,
        "starting exporter"
    );

    server::http::run(config).await
}

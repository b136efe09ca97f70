use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};

use rewind::config::Config;
use rewind::generate::GeminiClient;
use rewind::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // A missing .env is fine; everything also comes from the real environment
    if let Ok(path) = dotenvy::dotenv() {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = Config::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY is not set; every submission will report a generation error");
    }

    std::fs::create_dir_all(&config.media_root).with_context(|| {
        format!(
            "Failed to create media directory: {}",
            config.media_root.display()
        )
    })?;

    let generator = Arc::new(
        GeminiClient::from_config(&config).context("Failed to build model HTTP client")?,
    );
    let state = AppState::from_config(generator, &config);
    let app = server::router(state, &config.static_root);

    let addr = config.bind_addr();
    tracing::info!(
        model = %config.model,
        interpreter = %config.interpreter,
        timeout_secs = config.timeout_secs,
        "Starting rewind on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

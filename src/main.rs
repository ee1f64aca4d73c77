use std::path::PathBuf;

use anyhow::Result;
use chat_ocr::config::AppConfig;
use chat_ocr::errors::error_logging;
use chat_ocr::image_input::ImageInput;
use chat_ocr::observability;
use chat_ocr::pipeline::TextExtractor;
use serde_json::json;
use tracing::{error, info};

const USAGE: &str = "Usage: chat-ocr [--detailed] <image>...";

/// Load and validate configuration at startup
fn load_configuration() -> Result<AppConfig> {
    let config = AppConfig::from_env().map_err(|e| {
        error_logging::log_config_error(&e, "environment", "load_configuration");
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    config.validate().map_err(|e| {
        anyhow::anyhow!(
            "Configuration validation failed: {}. Please check your environment variables.",
            e
        )
    })?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let mut detailed = false;
    let mut paths: Vec<PathBuf> = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--detailed" => detailed = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => paths.push(PathBuf::from(arg)),
        }
    }
    if paths.is_empty() {
        anyhow::bail!("{USAGE}");
    }

    let config = load_configuration()?;
    let metrics_handle = observability::init_observability_with_config(&config.observability)?;
    info!("{}", config.summary());

    let extractor = std::sync::Arc::new(TextExtractor::from_app_config(&config)?);
    info!(
        providers = ?extractor.registry().ids(),
        max_attempts = extractor.config().max_attempts,
        "Extractor ready"
    );

    // Images are independent; each gets its own task
    let handles: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let extractor = std::sync::Arc::clone(&extractor);
            tokio::spawn(async move {
                let image = ImageInput::File(path.clone());
                let report = extractor.run_detailed(&image).await;
                (path, report)
            })
        })
        .collect();

    for handle in handles {
        match handle.await {
            Ok((path, report)) => {
                let line = if detailed {
                    json!({ "path": path, "report": report })
                } else {
                    json!({ "path": path, "result": report.result })
                };
                println!("{line}");
            }
            Err(e) => error!(error = %e, "Extraction task failed"),
        }
    }

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(())
}

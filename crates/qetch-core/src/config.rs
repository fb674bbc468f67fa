//! Settings persistence and HTTP client construction

use crate::error::QetchError;
use qetch_types::EngineSettings;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Load settings from a JSON file; a missing file yields the defaults
pub async fn load_settings(path: &Path) -> Result<EngineSettings, QetchError> {
    if !path.exists() {
        debug!("No settings at {:?}, using defaults", path);
        return Ok(EngineSettings::default());
    }

    let content = fs::read_to_string(path).await?;
    let settings: EngineSettings = serde_json::from_str(&content)
        .map_err(|e| QetchError::Config(format!("{}: {}", path.display(), e)))?;
    settings.validate().map_err(QetchError::Config)?;

    info!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Save settings as pretty JSON, creating the parent directory if needed
pub async fn save_settings(path: &Path, settings: &EngineSettings) -> Result<(), QetchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| QetchError::Config(e.to_string()))?;
    fs::write(path, content).await?;

    Ok(())
}

/// Per-read network timeout, `None` when disabled
pub fn read_timeout(settings: &EngineSettings) -> Option<Duration> {
    (settings.read_timeout_secs > 0).then(|| Duration::from_secs(settings.read_timeout_secs))
}

/// Build the HTTP client shared by every fetch of an engine
pub fn build_client(settings: &EngineSettings) -> Result<Client, QetchError> {
    let mut builder = Client::builder().user_agent(settings.user_agent.clone());
    if settings.connect_timeout_secs > 0 {
        builder = builder.connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
    }

    builder
        .build()
        .map_err(|e| QetchError::Config(format!("failed to build HTTP client: {}", e)))
}

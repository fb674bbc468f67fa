//! CLI command implementations

use crate::output::{format_bytes, print_output};
use crate::progress::DownloadProgress;
use crate::{ConfigAction, OutputFormat};
use anyhow::{Context, Result};
use console::style;
use qetch_core::config::{load_settings, save_settings};
use qetch_core::{progress_channel, Content, DownloadEngine, GenericExtractor};
use qetch_types::{DownloadId, EngineSettings, ProbeInfo};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Download Commands
// ============================================================================

#[derive(Serialize)]
struct DownloadSummary {
    id: DownloadId,
    url: String,
    path: PathBuf,
    size: u64,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} Saved {}",
            style("✓").green().bold(),
            style(self.path.display()).cyan()
        )?;
        writeln!(f, "  ID: {}", self.id)?;
        write!(f, "  Size: {}", format_bytes(self.size))
    }
}

/// File name to save a raw link under when no output path is given
fn default_file_name(content: &Content) -> PathBuf {
    content
        .source
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

pub async fn get(
    config_path: &Path,
    url: &str,
    output: Option<PathBuf>,
    fragments: Option<usize>,
    connections: Option<usize>,
    quiet: bool,
    format: OutputFormat,
) -> Result<()> {
    let settings = load_settings(config_path).await?;
    let engine = DownloadEngine::new(settings)?;

    let content = GenericExtractor::extract(url)?;
    let destination = output.unwrap_or_else(|| default_file_name(&content));

    let mut options = engine.options();
    if let Some(fragments) = fragments {
        options = options.with_max_fragments(fragments);
    }
    if let Some(connections) = connections {
        options = options.with_max_connections(connections);
    }

    let show_bar = !quiet && matches!(format, OutputFormat::Human);
    let mut reporter = None;
    if show_bar {
        let (hook, rx) = progress_channel();
        options = options.with_progress_hook(hook);
        let label = destination.display().to_string();
        reporter = Some(DownloadProgress::new(label)?.follow(rx));
    }

    let handle = engine.spawn(content, destination.clone(), options);
    let id = handle.id();
    let mut join = Box::pin(handle.join());

    let finished = tokio::select! {
        result = &mut join => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            engine.cancel(id);
            join.await
        }
    };

    if let Some(reporter) = reporter {
        match reporter.await {
            Ok(bar) => bar.finish(&result),
            Err(e) => tracing::warn!("Progress bar task failed: {}", e),
        }
    }

    let path = result.with_context(|| format!("Download of {} failed", url))?;
    let size = tokio::fs::metadata(&path).await?.len();

    let summary = DownloadSummary {
        id,
        url: url.to_string(),
        path,
        size,
    };
    if !quiet || matches!(format, OutputFormat::Json) {
        print_output(&summary, format)?;
    }

    Ok(())
}

// ============================================================================
// Probe Commands
// ============================================================================

#[derive(Serialize)]
struct ProbeResult {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<ProbeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn probe_urls(config_path: &Path, urls: Vec<String>, format: OutputFormat) -> Result<()> {
    let settings = load_settings(config_path).await?;
    let engine = DownloadEngine::new(settings)?;

    let mut results = Vec::with_capacity(urls.len());
    for url in urls {
        let result = match engine.probe(&url).await {
            Ok(info) => ProbeResult {
                url,
                info: Some(info),
                error: None,
            },
            Err(e) => ProbeResult {
                url,
                info: None,
                error: Some(e.to_string()),
            },
        };
        results.push(result);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Human => {
            for result in &results {
                match (&result.info, &result.error) {
                    (Some(info), _) => {
                        println!("{} {}", style("✓").green(), result.url);
                        if info.final_url != info.url {
                            println!("    Redirected: {}", info.final_url);
                        }
                        println!("    Size: {}", format_bytes(info.length));
                        if let Some(ref ct) = info.content_type {
                            println!("    Type: {}", ct);
                        }
                        println!(
                            "    Ranges: {}",
                            if info.supports_range {
                                style("Yes").green()
                            } else {
                                style("No").yellow()
                            }
                        );
                    }
                    (None, error) => {
                        println!(
                            "{} {}: {}",
                            style("✗").red(),
                            result.url,
                            style(error.as_deref().unwrap_or("Unknown error")).red()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn config_action(
    config_path: &Path,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let settings = load_settings(config_path).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                }
                OutputFormat::Human => {
                    println!("Qetch Configuration ({}):", config_path.display());
                    println!();
                    println!("  Max fragments: {}", settings.max_fragments);
                    println!("  Max connections: {}", settings.max_connections);
                    println!("  Progress interval: {} ms", settings.progress_interval_ms);
                    println!(
                        "  Read timeout: {}",
                        match settings.read_timeout_secs {
                            0 => "Disabled".to_string(),
                            secs => format!("{} s", secs),
                        }
                    );
                    println!("  Connect timeout: {} s", settings.connect_timeout_secs);
                    println!(
                        "  Stream chunk size: {}",
                        format_bytes(settings.stream_chunk_size as u64)
                    );
                    println!("  User agent: {}", settings.user_agent);
                    println!(
                        "  Temp directory: {}",
                        settings
                            .temp_dir
                            .as_ref()
                            .map(|d| d.display().to_string())
                            .unwrap_or_else(|| "System default".to_string())
                    );
                }
            }
        }

        Some(ConfigAction::Path) => {
            println!("{}", config_path.display());
        }

        Some(ConfigAction::Reset) => {
            save_settings(config_path, &EngineSettings::default()).await?;
            println!("{} Settings reset to defaults", style("✓").green().bold());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_file_name_uses_last_segment() {
        let content = GenericExtractor::extract("http://example.com/files/video.mp4").unwrap();
        assert_eq!(default_file_name(&content), PathBuf::from("video.mp4"));
    }

    #[test]
    fn test_default_file_name_fallback() {
        let content = Content::new(
            "generic-root",
            "http://example.com/",
            vec!["http://example.com/".to_string()],
            Arc::new(GenericExtractor),
        )
        .unwrap();
        assert_eq!(default_file_name(&content), PathBuf::from("download"));
    }
}

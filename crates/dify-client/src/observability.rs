use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_env_filter(level: Option<String>) -> tracing_subscriber::EnvFilter {
    if let Some(level) = level
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Splits the JSON log path into directory and file name, creating the
/// directory. Returns `None` when the directory cannot be created so the
/// caller falls back to console output.
fn prepare_json_log_path(path: PathBuf) -> Option<(PathBuf, String)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!(
            "dify-client: cannot create log directory {}: {err}; logging to stderr",
            dir.display()
        );
        return None;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dify-client.logs.jsonl")
        .to_string();
    Some((dir, file_name))
}

/// Installs a global `tracing` subscriber once per process.
///
/// Libraries embedding the client usually install their own subscriber and
/// never call this; it exists for binaries and the bundled demo programs.
///
/// Environment variables:
/// - `DIFY_OBSERVABILITY`: enable/disable flag (default enabled).
/// - `DIFY_LOG_LEVEL`: level/filter override (`info`, `dify_client=debug`, ...).
/// - `DIFY_JSON_LOG_PATH`: if set, logs are written as JSON lines to that file
///   instead of the console. Falls back to the console when the file's
///   directory cannot be created.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let enabled = std::env::var("DIFY_OBSERVABILITY")
            .ok()
            .map(|v| parse_bool_env(&v).unwrap_or(true))
            .unwrap_or(true);
        if !enabled {
            return;
        }

        let env_filter = resolve_env_filter(std::env::var("DIFY_LOG_LEVEL").ok());
        if let Some((dir, file_name)) = std::env::var("DIFY_JSON_LOG_PATH")
            .ok()
            .and_then(|raw| prepare_json_log_path(PathBuf::from(raw)))
        {
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

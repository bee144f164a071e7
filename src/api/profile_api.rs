//! Profile API
//!
//! Entry points for the host application: logging setup, link import and export,
//! outbound and configuration export, and the shared compile settings.

use crate::codec::{decode_link, decode_record, encode_link, encode_record};
use crate::config::{self, CompileContext, ExportedConfig};
use crate::models::ProxyRecord;
use crate::outbound::{build_outbound, parse_outbound};

/// Get the version of the profile core library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize the core library (call once at startup)
/// `storage_path` is used to store log files in release mode
#[allow(unused_variables)]
pub fn init_core(storage_path: Option<String>) -> Result<bool, String> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    #[cfg(debug_assertions)]
    {
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let level = resolve_log_level();

        let log_dir = storage_path
            .as_ref()
            .map(|p| std::path::PathBuf::from(p).join("logs"))
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));

        std::fs::create_dir_all(&log_dir).map_err(|e| {
            format!(
                "Failed to create log directory {}: {}",
                log_dir.display(),
                e
            )
        })?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "proxyprofile_core");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until program exit
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("profile core initialized v{}", env!("CARGO_PKG_VERSION"));
    Ok(true)
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// Import a universal link as a fresh record
pub fn import_link(link: String) -> Result<ProxyRecord, String> {
    let profile = decode_link(link.trim()).map_err(|e| e.to_string())?;
    tracing::debug!("imported {} profile {}", profile.type_name(), profile.display_name());
    Ok(ProxyRecord::new(profile))
}

pub fn export_link(record: &ProxyRecord) -> Result<String, String> {
    encode_link(record.require_bean()).map_err(|e| e.to_string())
}

/// Import a single outbound JSON object
pub fn import_outbound(json: String) -> Result<ProxyRecord, String> {
    let doc: serde_json::Value = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    let Some(map) = doc.as_object() else {
        return Err("outbound must be a JSON object".to_string());
    };
    parse_outbound(map)
        .map(ProxyRecord::new)
        .ok_or_else(|| "unsupported outbound type".to_string())
}

/// Outbound JSON for one record, compiled with the current settings
pub fn export_outbound(record: &ProxyRecord) -> Result<String, String> {
    let ctx = config::snapshot();
    let outbound = build_outbound(record.require_bean(), &ctx).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&outbound).map_err(|e| e.to_string())
}

pub fn export_config(record: &ProxyRecord) -> Result<ExportedConfig, String> {
    config::export_config(record, &config::snapshot()).map_err(|e| e.to_string())
}

/// Row store bytes for a record
pub fn record_to_bytes(record: &ProxyRecord) -> Vec<u8> {
    encode_record(record)
}

pub fn record_from_bytes(bytes: Vec<u8>) -> Result<ProxyRecord, String> {
    decode_record(&bytes).map_err(|e| e.to_string())
}

pub fn get_settings() -> CompileContext {
    config::snapshot()
}

pub fn set_settings(ctx: CompileContext) {
    config::replace(ctx);
}

/// Replace the settings with the contents of a JSON file
pub fn load_settings(path: String) -> Result<CompileContext, String> {
    let ctx = CompileContext::load(&path).map_err(|e| format!("{:#}", e))?;
    config::replace(ctx.clone());
    Ok(ctx)
}

pub fn set_log_level(level: i32) {
    config::update(|ctx| ctx.log_level = level);
}

pub fn set_download_mbps(mbps: i32) {
    config::update(|ctx| ctx.download_mbps = mbps);
}
